use base64::{engine::general_purpose::STANDARD, Engine};

/// Base64 encoded MD5 digest, the form expected in a `Content-MD5` header.
pub fn content_md5(body: &[u8]) -> String {
    STANDARD.encode(md5::compute(body).0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_md5() {
        let cases = vec![
            (&b""[..], "1B2M2Y8AsgTpgAmY7PhCfg=="),
            (&b"hello"[..], "XUFAKrxLKna5cZ2REBfFkg=="),
        ];

        for (input, expected) in cases {
            assert_eq!(content_md5(input), expected, "failed for case: {:?}", input);
        }
    }
}
