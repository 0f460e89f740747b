use percent_encoding::percent_decode_str;

/// Decode an object key as delivered in storage event notifications
///
/// Keys arrive form-encoded: `+` stands for a space and other bytes are
/// percent-escaped.
pub fn decode_object_key(raw: &str) -> String {
    percent_decode_str(&raw.replace('+', " "))
        .decode_utf8_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_object_key() {
        assert_eq!(decode_object_key("logs/a+b.gz"), "logs/a b.gz");
        assert_eq!(decode_object_key("logs/a%2Bb.gz"), "logs/a+b.gz");
        assert_eq!(decode_object_key("logs/caf%C3%A9.gz"), "logs/café.gz");
        assert_eq!(decode_object_key("plain.gz"), "plain.gz");
    }
}
