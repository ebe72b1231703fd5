//! Compression and archive builtins
//!
//! gzip/deflate work over strings or binaries and yield binaries; the
//! decompressors yield a string when the inflated bytes are valid UTF-8.
//! Archives map between a name→content object and zip bytes; extraction
//! rejects entry names with `..` or absolute components.

use super::{fail, fndef, Args, FnCtx, Registry};
use crate::error::EngineResult;
use crate::udm::{Udm, UdmKind, UdmObject};
use flate2::read::{DeflateDecoder, GzDecoder};
use flate2::write::{DeflateEncoder, GzEncoder};
use flate2::Compression;
use indexmap::IndexMap;
use std::io::{Cursor, Read, Write};

pub(crate) fn register(registry: &mut Registry) {
    fndef!(registry, "gzip", 1..=1, ["string or binary"], gzip);
    fndef!(registry, "gunzip", 1..=1, ["binary"], gunzip);
    fndef!(registry, "deflate", 1..=1, ["string or binary"], deflate);
    fndef!(registry, "inflate", 1..=1, ["binary"], inflate);
    fndef!(registry, "zipArchive", 1..=1, ["object of name → content"], zip_archive);
    fndef!(registry, "unzipArchive", 1..=1, ["binary"], unzip_archive);
}

fn bytes_to_value(bytes: Vec<u8>) -> Udm {
    match String::from_utf8(bytes) {
        Ok(s) => Udm::string(s),
        Err(e) => Udm::binary(e.into_bytes()),
    }
}

fn gzip(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("gzip", args);
    let data = args.next_bytes()?;
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&data)
        .and_then(|_| encoder.finish())
        .map(Udm::binary)
        .map_err(|e| fail("gzip", "compressible input", e.to_string(), ""))
}

fn gunzip(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("gunzip", args);
    let data = args.next_bytes()?;
    let mut out = Vec::new();
    GzDecoder::new(data.as_slice())
        .read_to_end(&mut out)
        .map_err(|e| fail("gunzip", "a gzip stream", e.to_string(), ""))?;
    Ok(bytes_to_value(out))
}

fn deflate(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("deflate", args);
    let data = args.next_bytes()?;
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&data)
        .and_then(|_| encoder.finish())
        .map(Udm::binary)
        .map_err(|e| fail("deflate", "compressible input", e.to_string(), ""))
}

fn inflate(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("inflate", args);
    let data = args.next_bytes()?;
    let mut out = Vec::new();
    DeflateDecoder::new(data.as_slice())
        .read_to_end(&mut out)
        .map_err(|e| fail("inflate", "a deflate stream", e.to_string(), ""))?;
    Ok(bytes_to_value(out))
}

fn entry_bytes(function: &'static str, value: &Udm) -> EngineResult<Vec<u8>> {
    match &value.kind {
        UdmKind::Str(s) => Ok(s.clone().into_bytes()),
        UdmKind::Binary(b) => Ok(b.clone()),
        _ => Err(fail(
            function,
            "string or binary entry contents",
            value.type_name(),
            "",
        )),
    }
}

fn zip_archive(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("zipArchive", args);
    let entries = args.next_object()?;
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = zip::write::FileOptions::default();
    for (name, content) in &entries {
        let content = entry_bytes("zipArchive", content)?;
        writer
            .start_file(name.as_str(), options)
            .and_then(|_| writer.write_all(&content).map_err(zip::result::ZipError::Io))
            .map_err(|e| fail("zipArchive", "writable entries", e.to_string(), ""))?;
    }
    let cursor = writer
        .finish()
        .map_err(|e| fail("zipArchive", "a finishable archive", e.to_string(), ""))?;
    Ok(Udm::binary(cursor.into_inner()))
}

/// Entry names are checked before extraction: no parent traversal, no
/// absolute paths
fn safe_entry_name(name: &str) -> bool {
    !name.starts_with('/')
        && !name.starts_with('\\')
        && !name.contains(':')
        && !name.split(['/', '\\']).any(|part| part == "..")
}

fn unzip_archive(_: &mut dyn FnCtx, args: Vec<Udm>) -> EngineResult<Udm> {
    let mut args = Args::new("unzipArchive", args);
    let data = args.next_bytes()?;
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| fail("unzipArchive", "a zip archive", e.to_string(), ""))?;
    let mut out: UdmObject = IndexMap::new();
    for i in 0..archive.len() {
        let mut file = archive
            .by_index(i)
            .map_err(|e| fail("unzipArchive", "readable entries", e.to_string(), ""))?;
        let name = file.name().to_string();
        if !safe_entry_name(&name) {
            return Err(fail(
                "unzipArchive",
                "safe entry names",
                "an entry escaping the archive root",
                "entries with '..' or absolute paths are rejected",
            ));
        }
        if file.is_dir() {
            continue;
        }
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| fail("unzipArchive", "readable entries", e.to_string(), ""))?;
        out.insert(name, bytes_to_value(content));
    }
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
    fn gzip_round_trip() {
        let compressed = gzip(&mut NoCtx, vec![Udm::string("hello hello hello")]).unwrap();
        assert!(matches!(compressed.kind, UdmKind::Binary(_)));
        let restored = gunzip(&mut NoCtx, vec![compressed]).unwrap();
        assert_eq!(restored, Udm::string("hello hello hello"));
    }

    #[test]
    fn deflate_round_trip() {
        let compressed = deflate(&mut NoCtx, vec![Udm::string("abcabcabc")]).unwrap();
        let restored = inflate(&mut NoCtx, vec![compressed]).unwrap();
        assert_eq!(restored, Udm::string("abcabcabc"));
    }

    #[test]
    fn zip_archive_round_trip() {
        let mut entries: UdmObject = IndexMap::new();
        entries.insert("a.txt".to_string(), Udm::string("first"));
        entries.insert("dir/b.txt".to_string(), Udm::string("second"));
        let archive = zip_archive(&mut NoCtx, vec![Udm::object(entries)]).unwrap();
        let restored = unzip_archive(&mut NoCtx, vec![archive]).unwrap();
        let map = restored.as_object().unwrap();
        assert_eq!(map["a.txt"], Udm::string("first"));
        assert_eq!(map["dir/b.txt"], Udm::string("second"));
    }

    #[test]
    fn entry_name_safety() {
        assert!(safe_entry_name("a/b.txt"));
        assert!(!safe_entry_name("../evil"));
        assert!(!safe_entry_name("a/../../evil"));
        assert!(!safe_entry_name("/abs"));
        assert!(!safe_entry_name("C:\\win"));
    }
}
