use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};

use crate::audio_source::AudioPlatform;
use crate::extractor::{SnippetExtractor, SourceFile};
use crate::scan::SnippetSink;
use crate::snippet::EncodedSnippet;

/// Extensions accepted as audio uploads.
pub const AUDIO_EXTENSIONS: [&str; 6] = ["mp3", "wav", "aac", "ogg", "flac", "m4a"];

#[derive(Debug, Clone, PartialEq)]
pub enum FileStatus {
    Pending,
    Preparing,
    Uploading,
    Uploaded,
    Error(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    NotAudio,
    TooLarge { size: u64, limit: u64 },
    Duplicate,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Rejection::NotAudio => write!(f, "not an audio file"),
            Rejection::TooLarge { size, limit } => write!(
                f,
                "{} exceeds the {}MB limit",
                format_file_size(*size),
                limit / (1024 * 1024)
            ),
            Rejection::Duplicate => write!(f, "already queued"),
        }
    }
}

/// Human readable size, e.g. `"1.5 MB"` or `"512 KB"`.
pub fn format_file_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".into();
    }
    const UNITS: [&str; 5] = ["Bytes", "KB", "MB", "GB", "TB"];
    let i = ((bytes as f64).ln() / 1024f64.ln()).floor() as usize;
    let i = i.min(UNITS.len() - 1);
    let value = bytes as f64 / 1024f64.powi(i as i32);
    if i > 1 {
        let rounded = (value * 10.0).round() / 10.0;
        format!("{} {}", rounded, UNITS[i])
    } else {
        format!("{} {}", value.round(), UNITS[i])
    }
}

/// Files waiting to be prepared, in the order they were added.
#[derive(Debug, Default)]
pub struct UploadQueue {
    files: Vec<SourceFile>,
    max_file_bytes: u64,
}

impl UploadQueue {
    pub fn new(max_file_bytes: u64) -> UploadQueue {
        UploadQueue {
            files: Vec::new(),
            max_file_bytes,
        }
    }

    /// Checks a candidate by name and size before its bytes are read.
    pub fn check(&self, name: &str, size: u64) -> Result<(), Rejection> {
        let is_audio = Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .map_or(false, |e| AUDIO_EXTENSIONS.contains(&e.as_str()));
        if !is_audio {
            return Err(Rejection::NotAudio);
        }
        if size > self.max_file_bytes {
            return Err(Rejection::TooLarge {
                size,
                limit: self.max_file_bytes,
            });
        }
        if self.files.iter().any(|f| f.name == name && f.size() == size) {
            return Err(Rejection::Duplicate);
        }
        Ok(())
    }

    pub fn add(&mut self, file: SourceFile) -> Result<(), Rejection> {
        self.check(&file.name, file.size())?;
        self.files.push(file);
        Ok(())
    }

    /// Reads and queues a file from disk. The size limit is applied before
    /// the file is read.
    pub fn add_path(&mut self, path: &Path) -> std::io::Result<Result<(), Rejection>> {
        let size = std::fs::metadata(path)?.len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if let Err(rejection) = self.check(&name, size) {
            return Ok(Err(rejection));
        }
        Ok(self.add(SourceFile::read(path)?))
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.files.iter().map(|f| f.name.as_str())
    }

    pub fn into_files(self) -> Vec<SourceFile> {
        self.files
    }
}

#[derive(Debug)]
pub struct BatchEntry<R> {
    pub name: String,
    pub size: u64,
    pub status: FileStatus,
    pub receipt: Option<R>,
}

/// Prepares and delivers every queued file, one at a time and in order.
///
/// Each file is decoded and rendered on a blocking worker. A failed file is
/// marked with [`FileStatus::Error`] and the batch moves on. `on_status` is
/// called on every status change.
pub async fn run_batch<P, S, F>(
    extractor: Arc<SnippetExtractor<P>>,
    queue: UploadQueue,
    sink: &S,
    mut on_status: F,
) -> Vec<BatchEntry<S::Receipt>>
where
    P: AudioPlatform + Send + Sync + 'static,
    S: SnippetSink,
    F: FnMut(usize, &str, &FileStatus),
{
    let mut entries: Vec<BatchEntry<S::Receipt>> = queue
        .names()
        .map(|name| BatchEntry {
            name: name.to_string(),
            size: 0,
            status: FileStatus::Pending,
            receipt: None,
        })
        .collect();

    for (index, file) in queue.into_files().into_iter().enumerate() {
        let entry = &mut entries[index];
        entry.size = file.size();

        let mut set_status = |entry: &mut BatchEntry<S::Receipt>, status: FileStatus| {
            on_status(index, &entry.name, &status);
            entry.status = status;
        };

        set_status(entry, FileStatus::Preparing);
        let worker = extractor.clone();
        let prepared = tokio::task::spawn_blocking(move || worker.prepare(&file)).await;

        let snippet = match prepared {
            Ok(Ok(snippet)) => snippet,
            Ok(Err(err)) => {
                set_status(entry, FileStatus::Error(err.to_string()));
                continue;
            }
            Err(err) => {
                warn!("snippet worker for {} failed: {}", entry.name, err);
                set_status(entry, FileStatus::Error(format!("processing failed: {}", err)));
                continue;
            }
        };

        set_status(entry, FileStatus::Uploading);
        match sink.deliver(snippet).await {
            Ok(receipt) => {
                entry.receipt = Some(receipt);
                set_status(entry, FileStatus::Uploaded);
            }
            Err(err) => {
                warn!("could not deliver snippet for {}: {}", entry.name, err);
                set_status(entry, FileStatus::Error(err.to_string()));
            }
        }
    }

    let failed = entries
        .iter()
        .filter(|e| matches!(e.status, FileStatus::Error(_)))
        .count();
    info!("batch finished: {} ok, {} failed", entries.len() - failed, failed);
    entries
}

/// Writes snippets into a directory instead of uploading them.
pub struct DirectorySink {
    dir: PathBuf,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> DirectorySink {
        DirectorySink { dir: dir.into() }
    }
}

#[async_trait]
impl SnippetSink for DirectorySink {
    type Receipt = PathBuf;
    type Error = std::io::Error;

    async fn deliver(&self, snippet: EncodedSnippet) -> Result<PathBuf, std::io::Error> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(&snippet.file_name);
        tokio::fs::write(&path, &snippet.bytes).await?;
        info!("wrote {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_source::DecodedAudio;
    use crate::snippet::SnippetSettings;
    use crate::wav::encode_wav;
    use std::sync::Mutex;

    fn wav_bytes(seconds: f64) -> Vec<u8> {
        let frames = (seconds * 22050.0) as usize;
        encode_wav(&DecodedAudio::new(vec![vec![0.2; frames]], 22050)).unwrap()
    }

    struct RecordingSink {
        delivered: Mutex<Vec<String>>,
        fail_on: Option<&'static str>,
    }

    #[async_trait]
    impl SnippetSink for RecordingSink {
        type Receipt = usize;
        type Error = String;

        async fn deliver(&self, snippet: EncodedSnippet) -> Result<usize, String> {
            if let Some(prefix) = self.fail_on {
                if snippet.file_name.starts_with(prefix) {
                    return Err("upload refused".into());
                }
            }
            let mut delivered = self.delivered.lock().unwrap();
            delivered.push(snippet.file_name);
            Ok(delivered.len())
        }
    }

    #[test]
    fn queue_filters_candidates() {
        let mut queue = UploadQueue::new(1000);
        assert_eq!(queue.add(SourceFile::new("a.mp3", vec![0; 10])), Ok(()));
        assert_eq!(queue.add(SourceFile::new("notes.txt", vec![0; 10])), Err(Rejection::NotAudio));
        assert_eq!(queue.add(SourceFile::new("noext", vec![0; 10])), Err(Rejection::NotAudio));
        assert_eq!(
            queue.add(SourceFile::new("big.WAV", vec![0; 1001])),
            Err(Rejection::TooLarge { size: 1001, limit: 1000 })
        );
        assert_eq!(queue.add(SourceFile::new("a.mp3", vec![1; 10])), Err(Rejection::Duplicate));
        assert_eq!(queue.add(SourceFile::new("a.mp3", vec![1; 11])), Ok(()));
        assert_eq!(queue.add(SourceFile::new("b.flac", vec![0; 1000])), Ok(()));
        assert_eq!(queue.names().collect::<Vec<_>>(), vec!["a.mp3", "a.mp3", "b.flac"]);
    }

    #[test]
    fn add_path_checks_size_before_reading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("loud.wav");
        std::fs::write(&path, vec![0u8; 64]).unwrap();

        let mut queue = UploadQueue::new(32);
        assert_eq!(
            queue.add_path(&path).unwrap(),
            Err(Rejection::TooLarge { size: 64, limit: 32 })
        );
        let mut queue = UploadQueue::new(64);
        assert_eq!(queue.add_path(&path).unwrap(), Ok(()));
        assert_eq!(queue.len(), 1);
        assert!(queue.add_path(&dir.path().join("missing.wav")).is_err());
    }

    #[test]
    fn formats_sizes() {
        assert_eq!(format_file_size(0), "0 Bytes");
        assert_eq!(format_file_size(512), "512 Bytes");
        assert_eq!(format_file_size(2048), "2 KB");
        assert_eq!(format_file_size(1572864), "1.5 MB");
        assert_eq!(
            Rejection::TooLarge { size: 60 * 1024 * 1024, limit: 50 * 1024 * 1024 }.to_string(),
            "60 MB exceeds the 50MB limit"
        );
    }

    #[tokio::test]
    async fn failed_files_do_not_stop_the_batch() {
        let mut queue = UploadQueue::new(u64::MAX);
        queue.add(SourceFile::new("first.wav", wav_bytes(2.0))).unwrap();
        queue.add(SourceFile::new("tiny.wav", wav_bytes(0.5))).unwrap();
        queue.add(SourceFile::new("junk.mp3", b"nothing to see".repeat(20))).unwrap();
        queue.add(SourceFile::new("refused.wav", wav_bytes(1.5))).unwrap();
        queue.add(SourceFile::new("last.wav", wav_bytes(3.0))).unwrap();

        let sink = RecordingSink {
            delivered: Mutex::new(Vec::new()),
            fail_on: Some("refused_"),
        };
        let extractor = Arc::new(SnippetExtractor::native(SnippetSettings::default()));
        let mut events = Vec::new();
        let entries = run_batch(extractor, queue, &sink, |index, name, status| {
            events.push((index, name.to_string(), status.clone()));
        })
        .await;

        let statuses: Vec<_> = entries.iter().map(|e| (e.name.as_str(), e.status.clone())).collect();
        assert_eq!(statuses[0], ("first.wav", FileStatus::Uploaded));
        assert!(matches!(&statuses[1].1, FileStatus::Error(m) if m.contains("extract")));
        assert!(matches!(&statuses[2].1, FileStatus::Error(m) if m.contains("decode")));
        assert_eq!(statuses[3].1, FileStatus::Error("upload refused".into()));
        assert_eq!(statuses[4], ("last.wav", FileStatus::Uploaded));

        assert_eq!(entries[0].receipt, Some(1));
        assert_eq!(entries[4].receipt, Some(2));
        let delivered = sink.delivered.lock().unwrap();
        assert!(delivered[0].starts_with("first_S1_0s_T"));
        assert!(delivered[1].starts_with("last_S1_0s_T"));

        // strictly one file at a time, in order
        let order: Vec<usize> = events.iter().map(|(i, _, _)| *i).collect();
        let mut sorted = order.clone();
        sorted.sort();
        assert_eq!(order, sorted);
        assert_eq!(events[0], (0, "first.wav".to_string(), FileStatus::Preparing));
        assert_eq!(events[1], (0, "first.wav".to_string(), FileStatus::Uploading));
        assert_eq!(events[2], (0, "first.wav".to_string(), FileStatus::Uploaded));
    }

    #[tokio::test]
    async fn directory_sink_writes_snippets() {
        let dir = tempfile::tempdir().unwrap();
        let mut queue = UploadQueue::new(u64::MAX);
        queue.add(SourceFile::new("beat.wav", wav_bytes(1.2))).unwrap();

        let sink = DirectorySink::new(dir.path().join("out"));
        let extractor = Arc::new(SnippetExtractor::native(SnippetSettings::default()));
        let entries = run_batch(extractor, queue, &sink, |_, _, _| {}).await;

        let path = entries[0].receipt.as_ref().unwrap();
        let bytes = std::fs::read(path).unwrap();
        let wav = crate::wav::read_pcm16(&bytes).unwrap();
        assert_eq!(wav.sample_rate, 44100);
        assert_eq!(wav.channels(), 2);
        assert!((wav.length() as i64 - 52920).abs() <= 1);
    }
}
