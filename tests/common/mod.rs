//! Common test utilities and fixtures for installer integration tests
//!
//! Archives are built in memory with raw tar headers so tests can describe
//! entries a well-behaved archiver would refuse to write (`..`, absolute
//! names, links before their targets).

// Not every helper is used by every test binary
#![allow(dead_code)]

use std::io::{self, Cursor, Seek, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{Result, bail};
use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{EntryType, Header};

use ollama_installer::LifecycleSettings;
use ollama_installer::control::{ProcessEntry, ProcessTable};
use ollama_installer::health::HealthProbe;
use ollama_installer::install::{AssetDownload, ReleaseSource};

/// In-memory tar archive writer
#[derive(Default)]
pub struct TarFixture {
    bytes: Vec<u8>,
}

impl TarFixture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry with `name` and `link` copied verbatim into the header
    pub fn raw(mut self, kind: EntryType, name: &str, link: &str, mode: u32, data: &[u8]) -> Self {
        let mut header = Header::new_gnu();
        {
            let gnu = header.as_gnu_mut().expect("gnu header");
            gnu.name[..name.len()].copy_from_slice(name.as_bytes());
            gnu.linkname[..link.len()].copy_from_slice(link.as_bytes());
        }
        header.set_entry_type(kind);
        header.set_mode(mode);
        header.set_size(data.len() as u64);
        header.set_mtime(0);
        header.set_cksum();

        self.bytes.extend_from_slice(header.as_bytes());
        self.bytes.extend_from_slice(data);
        let padding = (512 - data.len() % 512) % 512;
        self.bytes.extend(std::iter::repeat_n(0u8, padding));
        self
    }

    pub fn dir(self, name: &str) -> Self {
        self.raw(EntryType::Directory, name, "", 0o755, &[])
    }

    pub fn file(self, name: &str, mode: u32, data: &[u8]) -> Self {
        self.raw(EntryType::Regular, name, "", mode, data)
    }

    pub fn symlink(self, name: &str, target: &str) -> Self {
        self.raw(EntryType::Symlink, name, target, 0o777, &[])
    }

    pub fn hard_link(self, name: &str, target: &str) -> Self {
        self.raw(EntryType::Link, name, target, 0o644, &[])
    }

    /// File header declaring `declared` bytes followed by only `data`, then
    /// end of stream
    pub fn truncated_file(mut self, name: &str, declared: u64, data: &[u8]) -> Vec<u8> {
        let mut header = Header::new_gnu();
        {
            let gnu = header.as_gnu_mut().expect("gnu header");
            gnu.name[..name.len()].copy_from_slice(name.as_bytes());
        }
        header.set_entry_type(EntryType::Regular);
        header.set_mode(0o755);
        header.set_size(declared);
        header.set_mtime(0);
        header.set_cksum();
        self.bytes.extend_from_slice(header.as_bytes());
        self.bytes.extend_from_slice(data);
        self.bytes
    }

    /// Finished uncompressed tar stream
    pub fn tar(mut self) -> Vec<u8> {
        self.bytes.extend(std::iter::repeat_n(0u8, 1024));
        self.bytes
    }

    /// Finished `.tgz` stream
    pub fn tgz(self) -> Vec<u8> {
        gzip(&self.tar())
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).expect("gzip write");
    encoder.finish().expect("gzip finish")
}

/// In-memory zip archive with `(name, contents)` entries; names ending in
/// `/` become directories
pub fn zip_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    add_zip_entries(&mut writer, entries);
    writer.finish().expect("zip finish").into_inner()
}

/// Like [`zip_archive`], but written without seeking, the way streaming
/// writers do: sizes and CRC follow each entry in a data descriptor
pub fn zip_stream_archive(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut buf = Vec::new();
    let mut writer = zip::ZipWriter::new_stream(&mut buf);
    add_zip_entries(&mut writer, entries);
    writer.finish().expect("zip finish");
    buf
}

fn add_zip_entries<W: Write + Seek>(writer: &mut zip::ZipWriter<W>, entries: &[(&str, &[u8])]) {
    use zip::write::SimpleFileOptions;

    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o755);
    for (name, data) in entries {
        if name.ends_with('/') {
            writer.add_directory(*name, options).expect("zip dir");
        } else {
            writer.start_file(*name, options).expect("zip file");
            writer.write_all(data).expect("zip write");
        }
    }
}

/// Deterministic bytes that deflate cannot shrink much
pub fn noise(len: usize) -> Vec<u8> {
    let mut state: u32 = 0x9e37_79b9;
    (0..len)
        .map(|_| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            state as u8
        })
        .collect()
}

/// Shell script standing in for the ollama binary.
///
/// Every invocation appends its arguments to `calls.log` next to the script.
/// `pull` exits with `pull_status`.
pub fn fake_ollama(pull_status: i32) -> String {
    format!(
        "#!/bin/sh\necho \"$@\" >> \"$(dirname \"$0\")/calls.log\"\nif [ \"$1\" = pull ]; then exit {pull_status}; fi\nexit 0\n"
    )
}

/// Place an executable script at `path`
#[cfg(unix)]
pub fn install_script(path: &Path, script: &str) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, script)?;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))?;
    Ok(())
}

/// Lines written to `calls.log` by [`fake_ollama`] scripts in `dir`
pub fn calls(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("calls.log"))
        .map(|log| log.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Release registry serving one asset from memory
pub struct FakeRegistry {
    asset_name: String,
    payload: Vec<u8>,
    content_length: Option<u64>,
    fetches: AtomicUsize,
}

impl FakeRegistry {
    pub fn new(asset_name: &str, payload: Vec<u8>) -> Self {
        let content_length = Some(payload.len() as u64);
        Self {
            asset_name: asset_name.to_string(),
            payload,
            content_length,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Number of `fetch_asset` calls so far
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ReleaseSource for FakeRegistry {
    async fn fetch_asset(&self, release: &str, asset_name: &str) -> Result<AssetDownload> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if asset_name != self.asset_name {
            bail!("failed to find asset {asset_name:?} in release {release:?}");
        }
        Ok(AssetDownload {
            url: format!("https://example.invalid/{release}/{asset_name}"),
            content_length: self.content_length,
            body: Box::new(Cursor::new(self.payload.clone())),
        })
    }
}

/// Health probe that turns healthy after a fixed number of failed probes
pub struct FakeHealth {
    healthy_after: Option<usize>,
    probes: AtomicUsize,
}

impl FakeHealth {
    pub fn healthy() -> Self {
        Self::healthy_after(0)
    }

    pub fn never() -> Self {
        Self {
            healthy_after: None,
            probes: AtomicUsize::new(0),
        }
    }

    pub fn healthy_after(failures: usize) -> Self {
        Self {
            healthy_after: Some(failures),
            probes: AtomicUsize::new(0),
        }
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

impl HealthProbe for FakeHealth {
    async fn is_healthy(&self) -> bool {
        let seen = self.probes.fetch_add(1, Ordering::SeqCst);
        self.healthy_after.is_some_and(|failures| seen >= failures)
    }
}

/// Process table listing fixed entries and recording termination requests
#[derive(Default)]
pub struct FakeProcessTable {
    entries: Vec<ProcessEntry>,
    refuse: Option<io::ErrorKind>,
    terminated: Mutex<Vec<u32>>,
}

impl FakeProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_process(mut self, pid: u32, executable: impl Into<PathBuf>) -> Self {
        self.entries.push(ProcessEntry {
            pid,
            executable: executable.into(),
        });
        self
    }

    /// Fail every `terminate` with `kind`; `NotFound` counts as already exited
    pub fn refusing(mut self, kind: io::ErrorKind) -> Self {
        self.refuse = Some(kind);
        self
    }

    pub fn terminated(&self) -> Vec<u32> {
        self.terminated.lock().expect("lock").clone()
    }
}

impl ProcessTable for FakeProcessTable {
    fn processes(&self) -> io::Result<Vec<ProcessEntry>> {
        Ok(self.entries.clone())
    }

    fn terminate(&self, pid: u32) -> io::Result<()> {
        self.terminated.lock().expect("lock").push(pid);
        match self.refuse {
            Some(kind) => Err(io::Error::from(kind)),
            None => Ok(()),
        }
    }

    fn is_ignorable(&self, err: &io::Error) -> bool {
        err.kind() == io::ErrorKind::NotFound
    }
}

/// Fast settings for orchestrator tests
pub fn test_settings(asset_name: &str) -> LifecycleSettings {
    LifecycleSettings {
        asset_name: asset_name.to_string(),
        post_start: Vec::new(),
        version_check_attempts: 10,
        retry_interval: Duration::from_millis(5),
        health_poll_interval: Duration::from_millis(5),
        start_timeout: Some(Duration::from_secs(10)),
        external_candidates: Vec::new(),
    }
}
