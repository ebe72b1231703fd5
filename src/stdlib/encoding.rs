//! Encoding builtins: base64, percent, hex and XML entity escaping

use super::{fail, fndef, Args, FnCtx, Registry};
use crate::error::EngineResult;
use crate::udm::Udm;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Keep the characters RFC 3986 marks unreserved
const URL_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

pub(crate) fn register(registry: &mut Registry) {
    fndef!(registry, "base64Encode", 1..=1, ["string or binary"], base64_encode);
    fndef!(registry, "base64Decode", 1..=1, ["string"], base64_decode);
    fndef!(registry, "urlEncode", 1..=1, ["string"], url_encode);
    fndef!(registry, "urlDecode", 1..=1, ["string"], url_decode);
    fndef!(registry, "hexEncode", 1..=1, ["string or binary"], hex_encode);
    fndef!(registry, "hexDecode", 1..=1, ["string"], hex_decode);
    fndef!(registry, "xmlEscape", 1..=1, ["string"], xml_escape);
    fndef!(registry, "xmlUnescape", 1..=1, ["string"], xml_unescape);
}

/// Decoded bytes surface as a string when they are valid UTF-8, otherwise
/// as a binary value
fn bytes_to_value(bytes: Vec<u8>) -> Udm {
    match String::from_utf8(bytes) {
        Ok(s) => Udm::string(s),
        Err(e) => Udm::binary(e.into_bytes()),
    }
}

fn base64_encode(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("base64Encode", args);
    Ok(Udm::string(BASE64.encode(args.next_bytes()?)))
}

fn base64_decode(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("base64Decode", args);
    let s = args.next_str()?;
    let bytes = BASE64.decode(s.trim()).map_err(|e| {
        fail("base64Decode", "valid base64", e.to_string(), "")
    })?;
    Ok(bytes_to_value(bytes))
}

fn url_encode(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("urlEncode", args);
    let s = args.next_str()?;
    Ok(Udm::string(
        utf8_percent_encode(&s, URL_ENCODE_SET).to_string(),
    ))
}

fn url_decode(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("urlDecode", args);
    let s = args.next_str()?;
    let decoded = percent_decode_str(&s)
        .decode_utf8()
        .map_err(|e| fail("urlDecode", "valid percent-encoding", e.to_string(), ""))?;
    Ok(Udm::string(decoded.into_owned()))
}

fn hex_encode(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("hexEncode", args);
    Ok(Udm::string(hex::encode(args.next_bytes()?)))
}

fn hex_decode(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("hexDecode", args);
    let s = args.next_str()?;
    let bytes = hex::decode(s.trim())
        .map_err(|e| fail("hexDecode", "valid hex", e.to_string(), ""))?;
    Ok(bytes_to_value(bytes))
}

fn xml_escape(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("xmlEscape", args);
    let s = args.next_str()?;
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    Ok(Udm::string(out))
}

fn xml_unescape(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("xmlUnescape", args);
    let s = args.next_str()?;
    let out = s
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&");
    Ok(Udm::string(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stdlib::FnCtx;
    use crate::udm::LambdaValue;

    struct NoCtx;
    impl FnCtx for NoCtx {
        fn apply(&mut self, _: &LambdaValue, _: Vec<Udm>) -> EngineResult<Udm> {
            unreachable!()
        }
    }

    #[test]
    fn base64_round_trip() {
        let encoded = base64_encode(&mut NoCtx, vec![Udm::string("hello")]).unwrap();
        assert_eq!(encoded, Udm::string("aGVsbG8="));
        let decoded = base64_decode(&mut NoCtx, vec![encoded]).unwrap();
        assert_eq!(decoded, Udm::string("hello"));
    }

    #[test]
    fn url_encoding_keeps_unreserved() {
        let encoded = url_encode(&mut NoCtx, vec![Udm::string("a b~c/d")]).unwrap();
        assert_eq!(encoded, Udm::string("a%20b~c%2Fd"));
        let decoded = url_decode(&mut NoCtx, vec![encoded]).unwrap();
        assert_eq!(decoded, Udm::string("a b~c/d"));
    }

    #[test]
    fn hex_round_trip() {
        let encoded = hex_encode(&mut NoCtx, vec![Udm::string("AB")]).unwrap();
        assert_eq!(encoded, Udm::string("4142"));
        assert_eq!(
            hex_decode(&mut NoCtx, vec![encoded]).unwrap(),
            Udm::string("AB")
        );
    }

    #[test]
    fn xml_escaping() {
        let escaped = xml_escape(&mut NoCtx, vec![Udm::string("<a & 'b'>")]).unwrap();
        assert_eq!(escaped, Udm::string("&lt;a &amp; &apos;b&apos;&gt;"));
        assert_eq!(
            xml_unescape(&mut NoCtx, vec![escaped]).unwrap(),
            Udm::string("<a & 'b'>")
        );
    }
}
