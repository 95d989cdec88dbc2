//! Chained error type for every decoder in this crate.
//!
//! This follows the same error-chaining idiom the rest of this codebase's
//! binary-format readers use: a small enum of structural `ErrorKind`s, each
//! carrying just enough context to reproduce the failure, wrapped so that
//! I/O and decompression failures can be threaded through with `?`.

error_chain::error_chain! {
    foreign_links {
        Io(::std::io::Error);
        Png(::png::EncodingError);
    }

    errors {
        Truncated(component: String, at: usize) {
            description("truncated input")
            display("{}: truncated input at offset {:#x}", component, at)
        }
        BadMagic(component: String, expected: String, at: usize) {
            description("bad magic")
            display("{}: expected magic {:?} at offset {:#x}", component, expected, at)
        }
        UnsupportedVersion(component: String, version: i64) {
            description("unsupported version")
            display("{}: unsupported version {}", component, version)
        }
        SizeMismatch(expected: usize, actual: usize) {
            description("decompressed size mismatch")
            display("decompressed size mismatch: expected {} bytes, got {}", expected, actual)
        }
        IndexOutOfRange(what: String, index: i64, len: usize) {
            description("index out of range")
            display("{} index {} is out of range (table has {} entries)", what, index, len)
        }
        DuplicateTextureRole(role: u32) {
            description("duplicate texture role")
            display("material has texture role {} more than once", role)
        }
        MissingColorMap {
            description("material has textures but no color map")
            display("material has one or more textures but is missing a color map")
        }
        MaterialHasBothTexturesAndChildren {
            description("material has both textures and children")
            display("material may not have both textures and child materials")
        }
        UnexpectedFooter(component: String) {
            description("unexpected or missing footer")
            display("{}: expected footer was missing or had unexpected values", component)
        }
        NotImplemented(what: String) {
            description("not implemented")
            display("not implemented: {}", what)
        }
        DecompressFailed(reason: String) {
            description("decompression failed")
            display("decompression failed: {}", reason)
        }
        OutOfMemory(requested: usize) {
            description("out of memory")
            display("refused to allocate {} bytes", requested)
        }
        InvariantFailed(file_kind: String, at: usize, message: String) {
            description("parse invariant failed")
            display("{} parse failed at offset {:#x}: {}", file_kind, at, message)
        }
    }
}

/// Returns early with an error, mirroring this codebase's existing Nitro
/// readers' `bail!`. The plain `bail!(kind)` form wraps an already-typed
/// `ErrorKind`; the `bail!(file_kind, cur, fmt...)` form is for ad hoc
/// invariants with no dedicated variant, formatted through this crate's
/// uniform `"<file-kind> parse failed at offset 0x{:x}: <message>"`
/// convention.
#[macro_export]
macro_rules! bail {
    ($kind:expr) => {
        return Err($crate::error::Error::from($kind))
    };
    ($file_kind:expr, $cur:expr, $($arg:tt)*) => {
        $crate::bail!($crate::error::ErrorKind::InvariantFailed(
            $file_kind.to_string(),
            $cur.offset(),
            format!($($arg)*),
        ))
    };
}

/// Turns a boolean invariant into a [`bail!`] on failure. `check!(cond,
/// kind)` bails with an already-typed `ErrorKind`; `check!(cond, file_kind,
/// cur, fmt...)` bails with an ad hoc, offset-annotated message.
#[macro_export]
macro_rules! check {
    ($cond:expr, $kind:expr) => {
        if !($cond) {
            $crate::bail!($kind);
        }
    };
    ($cond:expr, $file_kind:expr, $cur:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($file_kind, $cur, $($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::byte_cursor::ByteCursor;
    use crate::error::ErrorKind;

    fn typed_check(ok: bool) -> crate::error::Result<()> {
        crate::check!(ok, ErrorKind::MissingColorMap);
        Ok(())
    }

    fn ad_hoc_check(cur: &ByteCursor, ok: bool) -> crate::error::Result<()> {
        crate::check!(ok, "thing", cur, "field {} was wrong", 42);
        Ok(())
    }

    #[test]
    fn check_with_typed_kind_passes_through_unwrapped() {
        let err = typed_check(false).unwrap_err();
        match err.0 {
            ErrorKind::MissingColorMap => {}
            other => panic!("expected MissingColorMap, got {:?}", other),
        }
        assert!(typed_check(true).is_ok());
    }

    #[test]
    fn check_with_ad_hoc_message_reports_file_kind_and_offset() {
        let buf = [0u8; 8];
        let mut cur = ByteCursor::new(&buf);
        cur.skip(3);
        let err = ad_hoc_check(&cur, false).unwrap_err();
        let message = err.to_string();
        assert!(message.contains("thing parse failed at offset 0x3"), "{}", message);
        assert!(message.contains("field 42 was wrong"), "{}", message);
    }
}
