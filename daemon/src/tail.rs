//! Line follower for a log file that another process keeps appending to.

use std::fs::File;
use std::io::{self, BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

/// Wait between EOF checks while following.
pub const FOLLOW_POLL: Duration = Duration::from_millis(200);

pub struct Tail {
    path: PathBuf,
    reader: BufReader<File>,
    pos: u64,
    follow: bool,
    pending: Vec<u8>,
}

impl Tail {
    /// Open `path`. Without `from_start` only lines written after this call
    /// are returned. Without `follow` the first EOF ends the stream.
    pub fn open(path: &Path, from_start: bool, follow: bool) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let pos = if from_start { 0 } else { file.seek(SeekFrom::End(0))? };
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            pos,
            follow,
            pending: Vec::new(),
        })
    }

    /// Next complete line without its terminator, or `None` at the end of a
    /// non-following stream. Blocks while following.
    pub fn next_line(&mut self) -> io::Result<Option<String>> {
        loop {
            let n = self.reader.read_until(b'\n', &mut self.pending)?;
            self.pos += n as u64;

            if self.pending.ends_with(b"\n") {
                return Ok(Some(self.take_pending()));
            }
            if n > 0 {
                continue;
            }

            // EOF with possibly a partial line buffered
            if !self.follow {
                if self.pending.is_empty() {
                    return Ok(None);
                }
                return Ok(Some(self.take_pending()));
            }
            self.check_truncated()?;
            thread::sleep(FOLLOW_POLL);
        }
    }

    fn take_pending(&mut self) -> String {
        let line = String::from_utf8_lossy(&self.pending)
            .trim_end_matches(['\n', '\r'])
            .to_string();
        self.pending.clear();
        line
    }

    /// Start over when the file was truncated or rotated under us.
    fn check_truncated(&mut self) -> io::Result<()> {
        let len = match std::fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            // Rotation in progress
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e),
        };
        if len < self.pos {
            log::info!("{} truncated, reading from the start", self.path.display());
            self.reader = BufReader::new(File::open(&self.path)?);
            self.pos = 0;
            self.pending.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn reads_whole_file_without_follow() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "first\r\nsecond\nthird").unwrap();

        let mut tail = Tail::open(file.path(), true, false).unwrap();
        assert_eq!(tail.next_line().unwrap().as_deref(), Some("first"));
        assert_eq!(tail.next_line().unwrap().as_deref(), Some("second"));
        assert_eq!(tail.next_line().unwrap().as_deref(), Some("third"));
        assert_eq!(tail.next_line().unwrap(), None);
    }

    #[test]
    fn skips_existing_lines_unless_from_start() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "old").unwrap();

        let mut tail = Tail::open(file.path(), false, false).unwrap();
        writeln!(file, "new").unwrap();
        file.flush().unwrap();
        assert_eq!(tail.next_line().unwrap().as_deref(), Some("new"));
        assert_eq!(tail.next_line().unwrap(), None);
    }

    #[test]
    fn invalid_utf8_is_replaced() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"bad \xff byte\n").unwrap();

        let mut tail = Tail::open(file.path(), true, false).unwrap();
        assert_eq!(tail.next_line().unwrap().as_deref(), Some("bad \u{fffd} byte"));
    }

    #[test]
    fn follow_picks_up_appended_lines() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let mut tail = Tail::open(file.path(), true, true).unwrap();

        let writer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            write!(file, "part").unwrap();
            file.flush().unwrap();
            thread::sleep(Duration::from_millis(50));
            writeln!(file, "ial").unwrap();
            file.flush().unwrap();
            // keep the file alive until the reader is done
            thread::sleep(Duration::from_millis(500));
        });

        assert_eq!(tail.next_line().unwrap().as_deref(), Some("partial"));
        writer.join().unwrap();
    }
}
