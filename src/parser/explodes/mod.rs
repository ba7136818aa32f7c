pub mod ss;
