use crate::error::{ReloadError, Result};
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Most bytes reserved up front; larger sources grow the buffer as they are read.
const MAX_PREALLOCATION: u64 = 64 * 1024;

/// Shader source text as handed to the compiler.
///
/// Every newline after the first is folded into a space when the text is
/// loaded. The first line (normally the `#version` directive) keeps its
/// terminator; all later line structure is lost. Some drivers only accept a
/// single directive line ahead of the body, which is why the fold exists.
/// Line-based preprocessor directives after the first line and `//` comments
/// do not survive it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderText {
    bytes: Vec<u8>,
    truncated: bool,
}

impl ShaderText {
    /// Loads and folds the shader source at `path`.
    ///
    /// # Errors
    ///
    /// - [`ReloadError::FileNotFound`] if the file does not exist
    /// - [`ReloadError::Io`] if it cannot be opened, sized or read
    ///
    /// A read that ends before the size reported by the filesystem is not an
    /// error: a warning is logged and the partial text is returned, see
    /// [`ShaderText::is_truncated`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => ReloadError::FileNotFound(path.to_path_buf()),
            _ => ReloadError::Io(path.to_path_buf(), e),
        })?;
        let expected = file
            .metadata()
            .map_err(|e| ReloadError::Io(path.to_path_buf(), e))?
            .len();
        Self::read_from(file, expected, path)
    }

    /// Reads up to `expected` bytes from `reader` and folds them.
    ///
    /// `origin` is only used for diagnostics.
    pub fn read_from(reader: impl Read, expected: u64, origin: &Path) -> Result<Self> {
        let reserve = usize::try_from(expected.min(MAX_PREALLOCATION)).unwrap_or(0);
        let mut bytes = Vec::with_capacity(reserve);
        reader
            .take(expected)
            .read_to_end(&mut bytes)
            .map_err(|e| ReloadError::Io(origin.to_path_buf(), e))?;

        let truncated = (bytes.len() as u64) < expected;
        if truncated {
            log::warn!(
                "short read of {}: got {} of {} bytes",
                origin.display(),
                bytes.len(),
                expected
            );
        }

        fold_newlines(&mut bytes);
        Ok(Self { bytes, truncated })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Source as text; invalid UTF-8 is replaced rather than rejected.
    pub fn as_str(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// True when fewer bytes were read than the file claimed to hold.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Replaces every `\n` after the first with a space.
pub fn fold_newlines(bytes: &mut [u8]) {
    let mut kept_first = false;
    for byte in bytes.iter_mut().filter(|b| **b == b'\n') {
        if kept_first {
            *byte = b' ';
        } else {
            kept_first = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn folds_all_but_first_newline() {
        let mut text = b"#version 400\nline1\nline2\nline3".to_vec();
        fold_newlines(&mut text);
        assert_eq!(text, b"#version 400\nline1 line2 line3");
    }

    #[test]
    fn fold_edge_cases() {
        let mut none = b"no newline".to_vec();
        fold_newlines(&mut none);
        assert_eq!(none, b"no newline");

        let mut leading = b"\n\n\n".to_vec();
        fold_newlines(&mut leading);
        assert_eq!(leading, b"\n  ");

        let mut crlf = b"#version 330\r\nvoid main() {}\r\n".to_vec();
        fold_newlines(&mut crlf);
        assert_eq!(crlf, b"#version 330\r\nvoid main() {}\r ");
    }

    #[test]
    fn load_reads_and_folds() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("fragment_shader.glsl");
        let source = concat!(
            "#version 400\n",
            "out vec4 frag_colour;\n",
            "void main() {\n",
            "\tfrag_colour = vec4(0.5, 0.0, 0.5, 1.0);\n",
            "}\n",
        );
        fs::write(&path, source).unwrap();

        let text = ShaderText::load(&path).unwrap();
        assert!(!text.is_truncated());
        assert_eq!(
            text.as_str(),
            concat!(
                "#version 400\n",
                "out vec4 frag_colour; void main() { ",
                "\tfrag_colour = vec4(0.5, 0.0, 0.5, 1.0); } ",
            )
        );
    }

    #[test]
    fn oversized_length_is_not_reserved_up_front() {
        let text = ShaderText::read_from(&b"#version 400\n"[..], u64::MAX, Path::new("sparse.glsl"))
            .unwrap();
        assert!(text.is_truncated());
        assert_eq!(text.as_bytes(), b"#version 400\n");
    }

    #[test]
    fn missing_file_is_not_found() {
        let tmp = TempDir::new().unwrap();
        let err = ShaderText::load(tmp.path().join("absent.glsl")).unwrap_err();
        assert!(matches!(err, ReloadError::FileNotFound(_)));
    }

    #[test]
    fn directory_is_io_failure() {
        let tmp = TempDir::new().unwrap();
        let err = ShaderText::load(tmp.path()).unwrap_err();
        assert!(matches!(err, ReloadError::Io(..)));
    }

    #[test]
    fn truncated_read_still_yields_text() {
        let partial: &[u8] = b"#version 400\nvoid";
        let text = ShaderText::read_from(partial, 64, Path::new("vertex_shader.glsl")).unwrap();
        assert!(text.is_truncated());
        assert_eq!(text.as_bytes(), b"#version 400\nvoid");
    }

    #[test]
    fn reads_no_more_than_expected() {
        let longer: &[u8] = b"#version 400\nabc\ndef";
        let text = ShaderText::read_from(longer, 17, Path::new("grown.glsl")).unwrap();
        assert!(!text.is_truncated());
        assert_eq!(text.as_bytes(), b"#version 400\nabc ");
    }

    #[test]
    fn empty_file_loads_empty() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("empty.glsl");
        fs::write(&path, "").unwrap();
        let text = ShaderText::load(&path).unwrap();
        assert!(text.is_empty());
        assert!(!text.is_truncated());
    }
}
