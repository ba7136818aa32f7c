use base64::{engine::general_purpose, Engine as _};

/// Encodes a string to Base64 format.
pub fn base64_encode(input: &str) -> String {
    general_purpose::STANDARD.encode(input)
}

/// Pads a Base64 string with `=` until its length is a multiple of 4.
///
/// Subscription converters frequently strip the trailing padding from
/// credentials, which the strict decoders reject.
pub fn pad_base64(input: &str) -> String {
    let mut padded = input.to_string();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    padded
}

/// Reverses a URL-safe Base64 string to standard Base64 format.
pub fn url_safe_base64_reverse(input: &str) -> String {
    input.replace('-', "+").replace('_', "/")
}

/// Decodes a Base64 string after correcting its padding.
///
/// Both the standard and the URL-safe alphabets are accepted. Unlike a
/// lossy decode, this returns `None` when the input is not Base64 or the
/// decoded bytes are not valid UTF-8.
///
/// # Arguments
/// * `input` - The Base64 encoded string, padded or not.
pub fn base64_decode_padded(input: &str) -> Option<String> {
    let padded = pad_base64(&url_safe_base64_reverse(input));
    let bytes = general_purpose::STANDARD.decode(padded).ok()?;
    String::from_utf8(bytes).ok()
}
