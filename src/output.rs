//! Output capture utilities.

use std::collections::VecDeque;

/// Bounded byte buffer that keeps the most recent bytes.
///
/// Once `cap` bytes are held, every further write drops bytes from the
/// front. The first drop sets [`truncated`](Self::truncated).
#[derive(Debug, Clone)]
pub struct TailBuffer {
    buf: VecDeque<u8>,
    cap: usize,
    truncated: bool,
}

impl TailBuffer {
    /// Create a buffer holding at most `cap` bytes (`cap` must be positive).
    pub fn new(cap: usize) -> Self {
        Self {
            buf: VecDeque::new(),
            cap: cap.max(1),
            truncated: false,
        }
    }

    /// Append bytes, discarding the oldest ones beyond the cap.
    pub fn write(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }

        let overflow = (self.buf.len() + data.len()).saturating_sub(self.cap);
        if overflow == 0 {
            self.buf.extend(data);
            return;
        }

        self.truncated = true;
        if overflow >= self.buf.len() {
            let skip = overflow - self.buf.len();
            self.buf.clear();
            self.buf.extend(&data[skip..]);
        } else {
            self.buf.drain(..overflow);
            self.buf.extend(data);
        }
    }

    /// Append `msg` on its own line unless the buffer already contains it.
    pub fn append_note(&mut self, msg: &str) {
        if msg.is_empty() || self.to_string_lossy().contains(msg) {
            return;
        }
        if !self.buf.is_empty() && self.buf.back() != Some(&b'\n') {
            self.write(b"\n");
        }
        self.write(msg.as_bytes());
    }

    /// Whether any byte was ever dropped.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Captured bytes as text, never longer than the cap.
    pub fn to_string_lossy(&self) -> String {
        self.lossy().0
    }

    /// Captured text and whether anything was lost.
    ///
    /// The flag covers bytes dropped by writes and characters clipped by
    /// [`to_string_lossy`](Self::to_string_lossy).
    pub fn into_text(self) -> (String, bool) {
        let (text, clipped) = self.lossy();
        (text, self.truncated || clipped)
    }

    /// A multi-byte character split by truncation, or any invalid UTF-8,
    /// is replaced; if that makes the text longer than the cap, whole
    /// characters are dropped from the front and the second value is true.
    fn lossy(&self) -> (String, bool) {
        let (front, back) = self.buf.as_slices();
        let mut bytes = Vec::with_capacity(self.buf.len());
        bytes.extend_from_slice(front);
        bytes.extend_from_slice(back);

        let text = String::from_utf8_lossy(&bytes).into_owned();
        if text.len() <= self.cap {
            return (text, false);
        }
        let mut start = text.len() - self.cap;
        while !text.is_char_boundary(start) {
            start += 1;
        }
        (text[start..].to_string(), true)
    }
}

/// Drop every line that contains one of `excluded`.
///
/// Line terminators of the kept lines are preserved.
pub fn filter_lines(text: &str, excluded: &[String]) -> String {
    if excluded.is_empty() {
        return text.to_string();
    }
    text.split_inclusive('\n')
        .filter(|line| !excluded.iter().any(|needle| line.contains(needle.as_str())))
        .collect()
}

/// Result of one execution.
///
/// Produced exactly once per `runner::run` call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecOutcome {
    /// Process exit code.
    ///
    /// 128 plus the signal number when the process was killed by a signal,
    /// 124 on timeout, 1 if it never ran or its status is unknown.
    pub exit_code: i32,

    /// Tail of standard output.
    pub stdout: String,

    /// Tail of standard error, plus any runner error text.
    pub stderr: String,

    /// Either stream dropped bytes.
    pub truncated: bool,

    /// The deadline fired and the process group was killed.
    pub timed_out: bool,
}

impl ExecOutcome {
    /// Check if the process exited with code 0 before the deadline.
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_cap_keeps_everything() {
        let mut buf = TailBuffer::new(16);
        buf.write(b"hello ");
        buf.write(b"world");
        assert_eq!(buf.to_string_lossy(), "hello world");
        assert!(!buf.truncated());
    }

    #[test]
    fn test_exact_cap_not_truncated() {
        let mut buf = TailBuffer::new(5);
        buf.write(b"abcde");
        assert_eq!(buf.to_string_lossy(), "abcde");
        assert!(!buf.truncated());
    }

    #[test]
    fn test_keeps_tail_across_writes() {
        let mut buf = TailBuffer::new(4);
        buf.write(b"abc");
        buf.write(b"def");
        assert_eq!(buf.to_string_lossy(), "cdef");
        assert!(buf.truncated());
    }

    #[test]
    fn test_single_large_write_keeps_tail() {
        let mut buf = TailBuffer::new(3);
        buf.write(b"0123456789");
        assert_eq!(buf.to_string_lossy(), "789");
        assert!(buf.truncated());
    }

    #[test]
    fn test_suffix_property() {
        let full: Vec<u8> = (0..1000u32).map(|i| b'a' + (i % 26) as u8).collect();
        let mut buf = TailBuffer::new(97);
        for chunk in full.chunks(13) {
            buf.write(chunk);
        }
        let captured = buf.to_string_lossy();
        assert_eq!(captured.len(), 97);
        assert!(std::str::from_utf8(&full).unwrap().ends_with(&captured));
        assert!(buf.truncated());
    }

    #[test]
    fn test_split_multibyte_stays_within_cap() {
        let mut buf = TailBuffer::new(5);
        // "é" is two bytes; the cap cuts the first one in half
        buf.write("ééé".as_bytes());
        let text = buf.to_string_lossy();
        assert!(text.len() <= 5);
        assert!(text.ends_with("éé"));
    }

    #[test]
    fn test_append_note() {
        let mut buf = TailBuffer::new(64);
        buf.write(b"partial");
        buf.append_note("boom");
        assert_eq!(buf.to_string_lossy(), "partial\nboom");

        buf.append_note("boom");
        assert_eq!(buf.to_string_lossy(), "partial\nboom");
    }

    #[test]
    fn test_append_note_respects_cap() {
        let mut buf = TailBuffer::new(6);
        buf.write(b"abcdef");
        buf.append_note("err");
        assert_eq!(buf.to_string_lossy(), "ef\nerr");
        assert!(buf.truncated());
    }

    #[test]
    fn test_filter_lines() {
        let excluded = vec!["Installation".to_string(), "powers-of-beta".to_string()];
        let text = "keep 1\nInstallation step\nkeep 2\nloading powers-of-beta\n";
        assert_eq!(filter_lines(text, &excluded), "keep 1\nkeep 2\n");
        assert_eq!(filter_lines(text, &[]), text);
    }

    #[test]
    fn test_invalid_utf8_clip_counts_as_truncation() {
        let mut buf = TailBuffer::new(4);
        buf.write(&[0xff, 0xfe, 0xfd, 0xfc]);
        assert!(!buf.truncated());

        let (text, truncated) = buf.into_text();
        assert_eq!(text, "\u{fffd}");
        assert!(truncated);
    }

    #[test]
    fn test_into_text_without_loss() {
        let mut buf = TailBuffer::new(8);
        buf.write(b"abc");
        assert_eq!(buf.into_text(), ("abc".to_string(), false));
    }
}
