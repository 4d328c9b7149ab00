//! yt-dlp backed [`Fetcher`].
//!
//! Each fetch runs yt-dlp as a child process that downloads the best audio
//! stream, converts it, and prints the title and final file path. Files are
//! staged under the download dir with a per-request unique stem so two
//! requests for the same video never share a file.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use anyhow::Context;
use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use voice_queue::{FetchError, Fetcher, MediaHandle, Track};

const STDERR_TAIL_LINES: usize = 5;

/// yt-dlp invocation settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct YtDlpOptions {
    pub binary: PathBuf,
    pub audio_format: String,
    pub audio_quality: String,
    pub default_search: String,
    pub extra_args: Vec<String>,
}

impl Default for YtDlpOptions {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("yt-dlp"),
            audio_format: "mp3".to_string(),
            audio_quality: "192K".to_string(),
            default_search: "ytsearch".to_string(),
            extra_args: Vec::new(),
        }
    }
}

pub struct YtDlpFetcher {
    options: YtDlpOptions,
    download_dir: PathBuf,
}

impl YtDlpFetcher {
    pub fn new(options: YtDlpOptions, download_dir: PathBuf) -> Self {
        Self {
            options,
            download_dir,
        }
    }

    fn build_args(&self, query: &str, stem: &str) -> Vec<String> {
        let template = self.download_dir.join(format!("{stem}.%(ext)s"));
        let mut args: Vec<String> = [
            "--format",
            "bestaudio/best",
            "--extract-audio",
            "--audio-format",
            self.options.audio_format.as_str(),
            "--audio-quality",
            self.options.audio_quality.as_str(),
            "--default-search",
            self.options.default_search.as_str(),
            "--no-playlist",
            "--no-progress",
            "--no-simulate",
            "--print",
            "title",
            "--print",
            "after_move:filepath",
            "--output",
        ]
        .iter()
        .map(|arg| arg.to_string())
        .collect();
        args.push(template.to_string_lossy().to_string());
        args.extend(self.options.extra_args.iter().cloned());
        args.push("--".to_string());
        args.push(query.to_string());
        args
    }
}

#[async_trait]
impl Fetcher for YtDlpFetcher {
    async fn fetch(&self, query: &str) -> Result<Track, FetchError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(FetchError::EmptyQuery);
        }
        let stem = Uuid::new_v4().simple().to_string();
        let args = self.build_args(query, &stem);
        debug!(query, stem = %stem, "running yt-dlp");

        let output = Command::new(&self.options.binary)
            .args(&args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(FetchError::Launch)?;

        if !output.status.success() {
            return Err(FetchError::Failed {
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let (title, path) = parse_output(&stdout)?;
        if !path.starts_with(&self.download_dir) {
            return Err(FetchError::InvalidOutput(format!(
                "file {} is outside the download dir",
                path.display()
            )));
        }
        info!(query, title = %title, path = %path.display(), "fetched track");
        Ok(Track::new(title, MediaHandle::new(path)))
    }

    async fn release(&self, track: &Track) {
        let path = track.handle().as_path();
        if !path.starts_with(&self.download_dir) {
            debug!(path = %path.display(), "not staged by us; keeping");
            return;
        }
        match tokio::fs::remove_file(path).await {
            Ok(()) => debug!(path = %path.display(), "removed staged audio"),
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!(path = %path.display(), error = %err, "failed to remove staged audio"),
        }
    }
}

/// Split yt-dlp's `--print` output into title and final file path.
fn parse_output(stdout: &str) -> Result<(String, PathBuf), FetchError> {
    let lines: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    match (lines.first(), lines.last()) {
        (Some(title), Some(path)) if lines.len() >= 2 => {
            Ok((title.to_string(), PathBuf::from(path)))
        }
        _ => Err(FetchError::InvalidOutput(format!(
            "expected title and file path, got {:?}",
            stdout.trim()
        ))),
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join(" | ")
}

/// Create the download dir and delete anything left from a previous run.
///
/// Returns the number of files removed.
pub fn purge_download_dir(dir: &Path) -> anyhow::Result<usize> {
    std::fs::create_dir_all(dir).with_context(|| format!("create download dir {:?}", dir))?;
    let mut removed = 0;
    for entry in std::fs::read_dir(dir).with_context(|| format!("read download dir {:?}", dir))? {
        let path = entry?.path();
        if path.is_file() {
            std::fs::remove_file(&path).with_context(|| format!("remove {:?}", path))?;
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "voice-queue-ytdlp-{tag}-{}",
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn parses_title_and_path() {
        let (title, path) =
            parse_output("Never Gonna Give You Up\n/srv/downloads/abc.mp3\n").unwrap();
        assert_eq!(title, "Never Gonna Give You Up");
        assert_eq!(path, PathBuf::from("/srv/downloads/abc.mp3"));
    }

    #[test]
    fn rejects_incomplete_output() {
        assert!(matches!(
            parse_output("only a title\n"),
            Err(FetchError::InvalidOutput(_))
        ));
        assert!(parse_output("").is_err());
    }

    #[test]
    fn args_put_query_after_separator() {
        let fetcher = YtDlpFetcher::new(
            YtDlpOptions {
                extra_args: vec!["--cookies".to_string(), "c.txt".to_string()],
                ..Default::default()
            },
            PathBuf::from("/srv/downloads"),
        );
        let args = fetcher.build_args("-rf song", "stem1");

        assert_eq!(&args[args.len() - 2..], ["--", "-rf song"]);
        assert!(args.contains(&"/srv/downloads/stem1.%(ext)s".to_string()));
        let cookies = args.iter().position(|arg| arg == "--cookies").unwrap();
        assert_eq!(args[cookies + 1], "c.txt");
        let quality = args.iter().position(|arg| arg == "--audio-quality").unwrap();
        assert_eq!(args[quality + 1], "192K");
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let stderr = b"one\ntwo\n\nthree\nfour\nfive\nsix\n";
        assert_eq!(stderr_tail(stderr), "two | three | four | five | six");
    }

    #[test]
    fn purge_removes_leftover_files() {
        let dir = temp_dir("purge");
        std::fs::write(dir.join("a.mp3"), b"stub").unwrap();
        std::fs::write(dir.join("b.webm.part"), b"stub").unwrap();

        assert_eq!(purge_download_dir(&dir).unwrap(), 2);
        assert_eq!(std::fs::read_dir(&dir).unwrap().count(), 0);
    }

    #[actix_web::test]
    async fn release_only_deletes_staged_files() {
        let dir = temp_dir("release");
        let outside = temp_dir("outside").join("keep.mp3");
        let staged = dir.join("staged.mp3");
        std::fs::write(&staged, b"stub").unwrap();
        std::fs::write(&outside, b"stub").unwrap();
        let fetcher = YtDlpFetcher::new(YtDlpOptions::default(), dir);

        fetcher
            .release(&Track::new("staged", MediaHandle::new(staged.clone())))
            .await;
        fetcher
            .release(&Track::new("keep", MediaHandle::new(outside.clone())))
            .await;
        // Second release of the same track is a no-op.
        fetcher
            .release(&Track::new("staged", MediaHandle::new(staged.clone())))
            .await;

        assert!(!staged.exists());
        assert!(outside.exists());
    }
}
