//! Hashing and symmetric crypto builtins
//!
//! Digests and MACs render as lowercase hex. AES runs in CBC mode with
//! PKCS#7 padding and accepts 128/192/256-bit keys. Failures from the
//! decryption path are reported generically so nothing about padding or
//! key material leaks through error messages, and `secureCompare` runs in
//! time independent of where the inputs differ.

use super::{fail, fndef, Args, FnCtx, Registry};
use crate::error::EngineResult;
use crate::udm::Udm;
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use hmac::{Hmac, Mac};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};

pub(crate) fn register(registry: &mut Registry) {
    fndef!(registry, "md5", 1..=1, ["string or binary"], md5_fn);
    fndef!(registry, "sha1", 1..=1, ["string or binary"], sha1_fn);
    fndef!(registry, "sha224", 1..=1, ["string or binary"], sha224_fn);
    fndef!(registry, "sha256", 1..=1, ["string or binary"], sha256_fn);
    fndef!(registry, "sha384", 1..=1, ["string or binary"], sha384_fn);
    fndef!(registry, "sha512", 1..=1, ["string or binary"], sha512_fn);
    fndef!(registry, "hmacSha1", 2..=2, ["key", "data"], hmac_sha1);
    fndef!(registry, "hmacSha256", 2..=2, ["key", "data"], hmac_sha256);
    fndef!(registry, "hmacSha512", 2..=2, ["key", "data"], hmac_sha512);
    fndef!(registry, "encryptAes", 3..=3, ["data", "key", "iv"], encrypt_aes);
    fndef!(registry, "decryptAes", 3..=3, ["ciphertext", "key", "iv"], decrypt_aes);
    fndef!(registry, "secureCompare", 2..=2, ["string", "string"], secure_compare);
}

fn digest_hex<D: Digest>(data: &[u8]) -> String {
    let mut hasher = D::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

macro_rules! digest_fn {
    ($fn_name:ident, $name:literal, $hasher:ty) => {
        fn $fn_name(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
            let mut args = Args::new($name, args);
            Ok(Udm::string(digest_hex::<$hasher>(&args.next_bytes()?)))
        }
    };
}

digest_fn!(md5_fn, "md5", Md5);
digest_fn!(sha1_fn, "sha1", Sha1);
digest_fn!(sha224_fn, "sha224", Sha224);
digest_fn!(sha256_fn, "sha256", Sha256);
digest_fn!(sha384_fn, "sha384", Sha384);
digest_fn!(sha512_fn, "sha512", Sha512);

macro_rules! hmac_fn {
    ($fn_name:ident, $name:literal, $hasher:ty) => {
        fn $fn_name(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
            let mut args = Args::new($name, args);
            let key = args.next_bytes()?;
            let data = args.next_bytes()?;
            let mut mac = <Hmac<$hasher> as Mac>::new_from_slice(&key)
                .map_err(|_| fail($name, "a usable key", "an invalid key length", ""))?;
            mac.update(&data);
            Ok(Udm::string(hex::encode(mac.finalize().into_bytes())))
        }
    };
}

hmac_fn!(hmac_sha1, "hmacSha1", Sha1);
hmac_fn!(hmac_sha256, "hmacSha256", Sha256);
hmac_fn!(hmac_sha512, "hmacSha512", Sha512);

fn check_iv(function: &'static str, iv: &[u8]) -> EngineResult<()> {
    if iv.len() == 16 {
        Ok(())
    } else {
        Err(fail(
            function,
            "a 16-byte initialisation vector",
            format!("{} bytes", iv.len()),
            "",
        ))
    }
}

/// AES-CBC/PKCS7; the key length selects AES-128, -192 or -256
fn encrypt_aes(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("encryptAes", args);
    let data = args.next_bytes()?;
    let key = args.next_bytes()?;
    let iv = args.next_bytes()?;
    check_iv("encryptAes", &iv)?;
    let ciphertext = match key.len() {
        16 => cbc::Encryptor::<aes::Aes128>::new_from_slices(&key, &iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(&data)),
        24 => cbc::Encryptor::<aes::Aes192>::new_from_slices(&key, &iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(&data)),
        32 => cbc::Encryptor::<aes::Aes256>::new_from_slices(&key, &iv)
            .map(|c| c.encrypt_padded_vec_mut::<Pkcs7>(&data)),
        other => {
            return Err(fail(
                "encryptAes",
                "a 16, 24 or 32 byte key",
                format!("{} bytes", other),
                "",
            ));
        }
    }
    .map_err(|_| fail("encryptAes", "a valid key/iv pair", "encryption failure", ""))?;
    Ok(Udm::string(BASE64.encode(ciphertext)))
}

fn decrypt_aes(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("decryptAes", args);
    let ciphertext = args.next_str()?;
    let key = args.next_bytes()?;
    let iv = args.next_bytes()?;
    check_iv("decryptAes", &iv)?;
    // generic failure text: padding and key errors must be indistinguishable
    let failure = || fail("decryptAes", "decryptable input", "decryption failed", "");
    let ciphertext = BASE64.decode(ciphertext.trim()).map_err(|_| failure())?;
    let plaintext = match key.len() {
        16 => cbc::Decryptor::<aes::Aes128>::new_from_slices(&key, &iv)
            .map_err(|_| failure())?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| failure())?,
        24 => cbc::Decryptor::<aes::Aes192>::new_from_slices(&key, &iv)
            .map_err(|_| failure())?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| failure())?,
        32 => cbc::Decryptor::<aes::Aes256>::new_from_slices(&key, &iv)
            .map_err(|_| failure())?
            .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
            .map_err(|_| failure())?,
        other => {
            return Err(fail(
                "decryptAes",
                "a 16, 24 or 32 byte key",
                format!("{} bytes", other),
                "",
            ));
        }
    };
    Ok(match String::from_utf8(plaintext) {
        Ok(s) => Udm::string(s),
        Err(e) => Udm::binary(e.into_bytes()),
    })
}

/// Equality in time independent of the position of the first difference
fn secure_compare(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("secureCompare", args);
    let a = args.next_bytes()?;
    let b = args.next_bytes()?;
    let mut difference = (a.len() ^ b.len()) as u8;
    let longest = a.len().max(b.len());
    for i in 0..longest {
        let x = a.get(i).copied().unwrap_or(0);
        let y = b.get(i).copied().unwrap_or(0);
        difference |= x ^ y;
    }
    Ok(Udm::bool(difference == 0))
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
    fn known_digests() {
        assert_eq!(
            md5_fn(&mut NoCtx, vec![Udm::string("abc")]).unwrap(),
            Udm::string("900150983cd24fb0d6963f7d28e17f72")
        );
        assert_eq!(
            sha256_fn(&mut NoCtx, vec![Udm::string("abc")]).unwrap(),
            Udm::string("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn hmac_sha256_rfc4231_case() {
        // RFC 4231 test case 2
        let out = hmac_sha256(
            &mut NoCtx,
            vec![Udm::string("Jefe"), Udm::string("what do ya want for nothing?")],
        )
        .unwrap();
        assert_eq!(
            out,
            Udm::string("5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843")
        );
    }

    #[test]
    fn aes_round_trip() {
        let key = Udm::string("0123456789abcdef0123456789abcdef");
        let iv = Udm::string("0123456789abcdef");
        let ciphertext = encrypt_aes(
            &mut NoCtx,
            vec![Udm::string("secret message"), key.clone(), iv.clone()],
        )
        .unwrap();
        let plaintext = decrypt_aes(&mut NoCtx, vec![ciphertext, key, iv]).unwrap();
        assert_eq!(plaintext, Udm::string("secret message"));
    }

    #[test]
    fn decrypt_failure_is_generic() {
        let key = Udm::string("0123456789abcdef");
        let iv = Udm::string("0123456789abcdef");
        let err = decrypt_aes(
            &mut NoCtx,
            vec![Udm::string("AAAAAAAAAAAAAAAAAAAAAA=="), key, iv],
        )
        .unwrap_err();
        assert!(err.to_string().contains("decryption failed"));
    }

    #[test]
    fn secure_compare_matches_equality() {
        let t = secure_compare(
            &mut NoCtx,
            vec![Udm::string("same"), Udm::string("same")],
        )
        .unwrap();
        assert_eq!(t, Udm::bool(true));
        let f = secure_compare(
            &mut NoCtx,
            vec![Udm::string("same"), Udm::string("other")],
        )
        .unwrap();
        assert_eq!(f, Udm::bool(false));
    }
}
