//! Line sources feeding the pipeline: a rotating JSONL file tail or stdin

use std::io::SeekFrom;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, AsyncSeekExt, BufReader, Lines, Stdin};
use tokio::time::sleep;

#[cfg(unix)]
use std::os::unix::fs::MetadataExt;

pub struct TailReader {
    path: PathBuf,
    file: Option<BufReader<File>>,
    inode: Option<u64>,
    poll_interval: Duration,
    from_beginning: bool,
    /// Bytes of a line whose newline has not been written yet
    pending: String,
}

impl TailReader {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            file: None,
            inode: None,
            poll_interval: Duration::from_millis(100),
            from_beginning: false,
            pending: String::new(),
        }
    }

    /// Replay existing content on the first open instead of seeking to the end
    pub fn from_beginning(mut self) -> Self {
        self.from_beginning = true;
        self
    }

    /// Start tailing the file
    pub async fn start(&mut self) -> std::io::Result<()> {
        let file = File::open(&self.path).await?;
        let metadata = file.metadata().await?;

        #[cfg(unix)]
        {
            self.inode = Some(metadata.ino());
        }
        #[cfg(not(unix))]
        let _ = metadata;

        let mut reader = BufReader::new(file);
        if !self.from_beginning {
            reader.seek(SeekFrom::End(0)).await?;
        }
        // Rotated files are always read from the start
        self.from_beginning = true;
        self.file = Some(reader);
        self.pending.clear();

        log::info!("📖 Started tailing: {}", self.path.display());
        Ok(())
    }

    /// Read the next complete non-empty line, waiting if necessary
    ///
    /// A line is complete once its newline has been written; a trailing
    /// fragment is held back until the writer finishes it.
    pub async fn read_line(&mut self) -> std::io::Result<String> {
        loop {
            if self.detect_rotation().await? {
                log::info!("🔄 File rotation detected, reopening: {}", self.path.display());
                if !self.pending.is_empty() {
                    log::warn!(
                        "Discarding {} bytes of unterminated line from rotated file",
                        self.pending.len()
                    );
                }
                self.start().await?;
            }

            let Some(reader) = self.file.as_mut() else {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "File not opened",
                ));
            };

            if reader.read_line(&mut self.pending).await? == 0 || !self.pending.ends_with('\n') {
                sleep(self.poll_interval).await;
                continue;
            }

            let line = std::mem::take(&mut self.pending);
            let line = line.trim();
            if !line.is_empty() {
                return Ok(line.to_string());
            }
        }
    }

    /// Detect if the file has been rotated (inode changed)
    async fn detect_rotation(&mut self) -> std::io::Result<bool> {
        #[cfg(unix)]
        {
            let metadata = tokio::fs::metadata(&self.path).await?;
            let current_inode = metadata.ino();
            Ok(self.inode.map_or(false, |old| old != current_inode))
        }

        #[cfg(not(unix))]
        {
            // On non-Unix systems, check file size decrease as heuristic
            if let Some(ref mut file) = self.file {
                let current_pos = file.stream_position().await?;
                let metadata = tokio::fs::metadata(&self.path).await?;
                Ok(metadata.len() < current_pos)
            } else {
                Ok(false)
            }
        }
    }
}

/// Where raw reading lines come from
pub enum LineSource {
    Tail(TailReader),
    Stdin(Lines<BufReader<Stdin>>),
}

impl LineSource {
    /// `-` reads stdin; anything else is tailed as a file
    pub async fn open(input: &str, from_beginning: bool) -> std::io::Result<Self> {
        if input == "-" {
            log::info!("📖 Reading readings from stdin");
            return Ok(LineSource::Stdin(BufReader::new(tokio::io::stdin()).lines()));
        }

        let mut reader = TailReader::new(PathBuf::from(input));
        if from_beginning {
            reader = reader.from_beginning();
        }
        reader.start().await?;
        Ok(LineSource::Tail(reader))
    }

    /// Next non-empty line; `None` once stdin is closed. A tailed file never ends.
    pub async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        match self {
            LineSource::Tail(reader) => reader.read_line().await.map(Some),
            LineSource::Stdin(lines) => loop {
                match lines.next_line().await? {
                    Some(line) if line.trim().is_empty() => continue,
                    Some(line) => return Ok(Some(line.trim().to_string())),
                    None => return Ok(None),
                }
            },
        }
    }
}
