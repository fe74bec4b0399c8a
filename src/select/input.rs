#![forbid(unsafe_code)]

use std::io::{self, Read};

const ESC: u8 = 0x1b;

/// Logical keys understood by the selection engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Up,
    Down,
    Enter,
    Space,
    Escape,
    Char(u8),
    /// The read timed out with nothing available.
    None,
}

pub trait KeySource {
    fn next_key(&mut self) -> io::Result<Key>;
}

/// Decodes keys from a byte stream whose reads return `Ok(0)` on timeout
/// (stdin with `VMIN = 0`).
#[derive(Debug)]
pub struct ByteDecoder<R> {
    reader: R,
}

impl<R: Read> ByteDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.reader.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn decode_escape(&mut self) -> io::Result<Key> {
        // A lone ESC followed by silence is the Escape key itself.
        match self.read_byte()? {
            Some(b'[' | b'O') => {}
            _ => return Ok(Key::Escape),
        }
        Ok(match self.read_byte()? {
            Some(b'A') => Key::Up,
            Some(b'B') => Key::Down,
            _ => Key::Escape,
        })
    }
}

impl<R: Read> KeySource for ByteDecoder<R> {
    fn next_key(&mut self) -> io::Result<Key> {
        let Some(byte) = self.read_byte()? else {
            return Ok(Key::None);
        };
        match byte {
            ESC => self.decode_escape(),
            b'\r' | b'\n' => Ok(Key::Enter),
            b' ' => Ok(Key::Space),
            other => Ok(Key::Char(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(bytes: &[u8]) -> Vec<Key> {
        let mut decoder = ByteDecoder::new(bytes);
        let mut keys = Vec::new();
        loop {
            let key = decoder.next_key().unwrap();
            if key == Key::None {
                return keys;
            }
            keys.push(key);
        }
    }

    #[test]
    fn decodes_arrow_sequences() {
        assert_eq!(
            decode_all(b"\x1b[A\x1b[B\x1bOA\x1bOB"),
            vec![Key::Up, Key::Down, Key::Up, Key::Down]
        );
    }

    #[test]
    fn bare_escape_on_timeout() {
        assert_eq!(decode_all(b"\x1b"), vec![Key::Escape]);
        assert_eq!(decode_all(b"\x1b["), vec![Key::Escape]);
    }

    #[test]
    fn unknown_sequences_degrade_to_escape() {
        // Right arrow is not a navigation key here.
        assert_eq!(decode_all(b"\x1b[C"), vec![Key::Escape]);
        assert_eq!(decode_all(b"\x1bx"), vec![Key::Escape]);
    }

    #[test]
    fn plain_bytes() {
        assert_eq!(
            decode_all(b"\r\n q"),
            vec![Key::Enter, Key::Enter, Key::Space, Key::Char(b'q')]
        );
    }

    #[test]
    fn empty_read_is_none() {
        let mut decoder = ByteDecoder::new(&b""[..]);
        assert_eq!(decoder.next_key().unwrap(), Key::None);
    }

    #[test]
    fn interrupted_read_is_none() {
        struct Interrupted;
        impl Read for Interrupted {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::from(io::ErrorKind::Interrupted))
            }
        }
        let mut decoder = ByteDecoder::new(Interrupted);
        assert_eq!(decoder.next_key().unwrap(), Key::None);
    }
}
