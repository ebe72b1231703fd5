//! JWT/JWS inspection builtins
//!
//! Decoding only: the header and payload are exposed as objects and the
//! signature as its raw base64url text. No signature verification happens
//! here; treat the output as untrusted data.

use super::{fail, fndef, Args, FnCtx, Registry};
use crate::error::EngineResult;
use crate::format::json;
use crate::udm::{Udm, UdmObject};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use indexmap::IndexMap;

pub(crate) fn register(registry: &mut Registry) {
    fndef!(registry, "decodeJwt", 1..=1, ["token"], decode_jwt);
    fndef!(registry, "decodeJws", 1..=1, ["token"], decode_jwt);
}

fn decode_part(function: &'static str, part: &str, what: &str) -> EngineResult<Udm> {
    let bytes = URL_SAFE_NO_PAD.decode(part).map_err(|_| {
        fail(
            function,
            format!("base64url in the {}", what),
            "undecodable bytes".to_string(),
            "",
        )
    })?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).map_err(|_| {
        fail(
            function,
            format!("JSON in the {}", what),
            "unparseable content".to_string(),
            "",
        )
    })?;
    Ok(json::from_json(value))
}

fn decode_jwt(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("decodeJwt", args);
    let token = args.next_str()?;
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 2 && parts.len() != 3 {
        return Err(fail(
            "decodeJwt",
            "a compact JWS token with 2 or 3 dot-separated parts",
            format!("{} part(s)", parts.len()),
            "",
        ));
    }
    let mut out: UdmObject = IndexMap::new();
    out.insert(
        "header".to_string(),
        decode_part("decodeJwt", parts[0], "header")?,
    );
    out.insert(
        "payload".to_string(),
        decode_part("decodeJwt", parts[1], "payload")?,
    );
    out.insert(
        "signature".to_string(),
        Udm::string(parts.get(2).copied().unwrap_or("")),
    );
    Ok(Udm::object(out))
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
    fn decodes_the_rfc7519_example_shape() {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(br#"{"sub":"1234567890","admin":true}"#);
        let token = format!("{}.{}.sig-bytes", header, payload);
        let decoded = decode_jwt(&mut NoCtx, vec![Udm::string(token)]).unwrap();
        let map = decoded.as_object().unwrap();
        assert_eq!(
            map["header"].as_object().unwrap()["alg"],
            Udm::string("HS256")
        );
        assert_eq!(
            map["payload"].as_object().unwrap()["admin"],
            Udm::bool(true)
        );
        assert_eq!(map["signature"], Udm::string("sig-bytes"));
    }

    #[test]
    fn wrong_shape_is_rejected() {
        assert!(decode_jwt(&mut NoCtx, vec![Udm::string("onlyonepart")]).is_err());
    }
}
