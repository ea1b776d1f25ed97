use bitflags::bitflags;
use std::ffi::OsStr;
use std::fmt;
use std::mem::size_of;
use std::os::unix::ffi::OsStrExt;

use crate::watcher::WatchDescriptor;

bitflags! {
    /// inotify event bits, used both as interest mask and as reported kind.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct EventMask: u32 {
        const OPEN = libc::IN_OPEN;
        const MODIFY = libc::IN_MODIFY;
        const CLOSE_WRITE = libc::IN_CLOSE_WRITE;
        const CLOSE_NOWRITE = libc::IN_CLOSE_NOWRITE;
        const CLOSE = Self::CLOSE_WRITE.bits() | Self::CLOSE_NOWRITE.bits();
        const IS_DIR = libc::IN_ISDIR;
        const IGNORED = libc::IN_IGNORED;
        const Q_OVERFLOW = libc::IN_Q_OVERFLOW;
    }
}

/// Size of the fixed part of a raw record (`struct inotify_event` without name).
pub const EVENT_HEADER_LEN: usize = size_of::<libc::inotify_event>();

/// One decoded change record, borrowing its name from the read buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeEvent<'a> {
    pub wd: WatchDescriptor,
    pub mask: EventMask,
    pub cookie: u32,
    /// File name relative to the watched directory; `None` for events on the
    /// directory itself.
    pub name: Option<&'a OsStr>,
}

impl ChangeEvent<'_> {
    pub fn is_dir(&self) -> bool {
        self.mask.contains(EventMask::IS_DIR)
    }
}

impl fmt::Display for ChangeEvent<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const KINDS: &[(EventMask, &str)] = &[
            (EventMask::OPEN, "IN_OPEN"),
            (EventMask::MODIFY, "IN_MODIFY"),
            (EventMask::CLOSE_NOWRITE, "IN_CLOSE_NOWRITE"),
            (EventMask::CLOSE_WRITE, "IN_CLOSE_WRITE"),
            (EventMask::IGNORED, "IN_IGNORED"),
        ];
        for (bit, label) in KINDS {
            if self.mask.contains(*bit) {
                write!(f, "{label}: ")?;
            }
        }
        if let Some(name) = self.name {
            write!(f, "{}", name.to_string_lossy())?;
        }
        f.write_str(if self.is_dir() { " [directory]" } else { " [file]" })
    }
}

/// Decodes a buffer filled by one `read` of an inotify descriptor.
///
/// The returned iterator is lazy and borrows `buf`. A trailing fragment too
/// short to hold its declared record ends the sequence.
pub fn decode(buf: &[u8]) -> Events<'_> {
    Events { buf, offset: 0 }
}

pub struct Events<'a> {
    buf: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for Events<'a> {
    type Item = ChangeEvent<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let rest = &self.buf[self.offset..];
        if rest.is_empty() {
            return None;
        }
        if rest.len() < EVENT_HEADER_LEN {
            log::warn!("discarding {} trailing bytes of partial event header", rest.len());
            self.offset = self.buf.len();
            return None;
        }

        let name_len = read_u32(rest, 12) as usize;
        let record_len = EVENT_HEADER_LEN + name_len;
        if rest.len() < record_len {
            log::warn!(
                "event record claims {} bytes but only {} remain",
                record_len,
                rest.len()
            );
            self.offset = self.buf.len();
            return None;
        }

        // The name field is NUL padded; an empty field means no name.
        let name = rest[EVENT_HEADER_LEN..record_len]
            .split(|b| *b == 0)
            .next()
            .filter(|name| !name.is_empty())
            .map(OsStr::from_bytes);

        self.offset += record_len;
        Some(ChangeEvent {
            wd: WatchDescriptor::from_raw(read_u32(rest, 0) as i32),
            mask: EventMask::from_bits_retain(read_u32(rest, 4)),
            cookie: read_u32(rest, 8),
            name,
        })
    }
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_ne_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encodes a record the way the kernel does, padding the name with NULs.
    fn record(buf: &mut Vec<u8>, wd: i32, mask: EventMask, name: &str, padded_len: usize) {
        assert!(padded_len == 0 || padded_len > name.len());
        buf.extend_from_slice(&wd.to_ne_bytes());
        buf.extend_from_slice(&mask.bits().to_ne_bytes());
        buf.extend_from_slice(&0u32.to_ne_bytes());
        buf.extend_from_slice(&(padded_len as u32).to_ne_bytes());
        buf.extend_from_slice(name.as_bytes());
        buf.resize(buf.len() + padded_len - name.len(), 0);
    }

    #[test]
    fn header_matches_kernel_layout() {
        assert_eq!(EVENT_HEADER_LEN, 16);
    }

    #[test]
    fn decodes_records_with_varying_name_lengths() {
        let mut buf = Vec::new();
        record(&mut buf, 1, EventMask::OPEN, "vertex_shader.glsl", 32);
        record(&mut buf, 1, EventMask::OPEN | EventMask::IS_DIR, "", 0);
        record(&mut buf, 1, EventMask::CLOSE_WRITE, "fragment_shader.glsl", 21);
        record(&mut buf, 1, EventMask::CLOSE_NOWRITE, "a", 16);
        record(&mut buf, 2, EventMask::MODIFY, "b", 2);

        let events: Vec<_> = decode(&buf).collect();
        assert_eq!(events.len(), 5);

        let names: Vec<_> = events.iter().map(|e| e.name.map(|n| n.to_str().unwrap())).collect();
        assert_eq!(
            names,
            vec![
                Some("vertex_shader.glsl"),
                None,
                Some("fragment_shader.glsl"),
                Some("a"),
                Some("b"),
            ]
        );

        assert!(events[1].is_dir());
        assert!(!events[0].is_dir());
        assert_eq!(events[2].mask, EventMask::CLOSE_WRITE);
        assert_eq!(events[4].wd, WatchDescriptor::from_raw(2));
        assert_eq!(events[4].mask, EventMask::MODIFY);
    }

    #[test]
    fn truncated_trailing_record_is_dropped() {
        let mut buf = Vec::new();
        record(&mut buf, 1, EventMask::CLOSE_WRITE, "vertex_shader.glsl", 32);
        record(&mut buf, 1, EventMask::CLOSE_WRITE, "fragment_shader.glsl", 32);
        buf.truncate(buf.len() - 8);

        let events: Vec<_> = decode(&buf).collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].name, Some(OsStr::new("vertex_shader.glsl")));
    }

    #[test]
    fn partial_header_is_dropped() {
        let mut buf = Vec::new();
        record(&mut buf, 1, EventMask::OPEN, "", 0);
        buf.extend_from_slice(&[1, 0, 0, 0, 2]);

        assert_eq!(decode(&buf).count(), 1);
        assert_eq!(decode(&[]).count(), 0);
    }

    #[test]
    fn unknown_bits_are_retained() {
        let mut buf = Vec::new();
        record(&mut buf, 1, EventMask::from_bits_retain(libc::IN_ATTRIB), "x", 16);
        let event = decode(&buf).next().unwrap();
        assert_eq!(event.mask.bits(), libc::IN_ATTRIB);
    }

    #[test]
    fn displays_like_event_dump() {
        let mut buf = Vec::new();
        record(&mut buf, 1, EventMask::CLOSE_WRITE, "fragment_shader.glsl", 32);
        record(&mut buf, 1, EventMask::OPEN | EventMask::IS_DIR, "", 0);
        record(&mut buf, 1, EventMask::IGNORED, "", 0);

        let lines: Vec<_> = decode(&buf).map(|e| e.to_string()).collect();
        assert_eq!(lines[0], "IN_CLOSE_WRITE: fragment_shader.glsl [file]");
        assert_eq!(lines[1], "IN_OPEN:  [directory]");
        assert_eq!(lines[2], "IN_IGNORED:  [file]");
    }
}
