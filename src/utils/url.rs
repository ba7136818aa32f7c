//! URL encoding/decoding utilities

/// Encodes a string using URL encoding
///
/// # Examples
/// ```
/// use subrelay::utils::url::url_encode;
///
/// let encoded = url_encode("https://example.com/sub?token=a b");
/// assert_eq!(encoded, "https%3A%2F%2Fexample.com%2Fsub%3Ftoken%3Da%20b");
/// ```
pub fn url_encode(input: &str) -> String {
    urlencoding::encode(input).into_owned()
}

/// Decodes a URL-encoded string
///
/// Invalid UTF-8 sequences produced by the decoding are replaced with
/// `U+FFFD` instead of failing.
///
/// # Examples
/// ```
/// use subrelay::utils::url::url_decode;
///
/// let decoded = url_decode("Hello%20World%21");
/// assert_eq!(decoded, "Hello World!");
/// ```
pub fn url_decode(input: &str) -> String {
    String::from_utf8_lossy(&urlencoding::decode_binary(input.as_bytes())).into_owned()
}

/// Decodes a URL-encoded string, treating a literal `+` as a space first.
///
/// `%2B` still decodes to `+`.
pub fn url_decode_plus(input: &str) -> String {
    url_decode(&input.replace('+', " "))
}

/// Appends a query string to `base`, using `&` when `base` already carries one.
pub fn append_query(base: &str, query: &str) -> String {
    let separator = if base.contains('?') { '&' } else { '?' };
    format!("{}{}{}", base, separator, query)
}
