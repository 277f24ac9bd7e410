//! Config Store (§4.C): client-side `ECHConfigList` holders and the
//! server-side `(config, private_key, load_time, source_id)` set with
//! PEM hot-reload, buffer dedup, and age-based flush.

use crate::EchError;
use ech_config::ECHConfigList;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Where one server entry's `source_id` came from, and what reload
/// behavior applies: file entries track an mtime and reload in place;
/// buffer entries are immutable once added.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Source {
    Pem { path: PathBuf, mtime: u64 },
    Buffer,
}

/// One server-side enabled ECH key: the config it advertises, the HPKE
/// private key it decrypts with, and bookkeeping for reload/flush.
#[derive(Debug, Clone)]
pub struct ServerEchKey {
    pub config: ech_config::ECHConfig,
    /// The config's exact wire bytes, as published — required verbatim
    /// as the HPKE `info` context prefix (§4.E step 4 / §4.F step 5).
    pub config_encoding: Vec<u8>,
    pub private_key: Vec<u8>,
    pub load_time: u64,
    pub source_id: String,
    source: Source,
}

impl ServerEchKey {
    fn matches_path(&self, path: &Path) -> bool {
        matches!(&self.source, Source::Pem { path: p, .. } if p == path)
    }

    /// The config's 8-bit short identifier, if it's a recognized version.
    pub fn config_id(&self) -> Option<u8> {
        match &self.config.contents {
            ech_config::ECHConfigBody::Known(c) => Some(c.config_id),
            ech_config::ECHConfigBody::Unknown(_) => None,
        }
    }

    /// The config's HPKE KEM identifier, if it's a recognized version.
    pub fn kem_id(&self) -> Option<u16> {
        match &self.config.contents {
            ech_config::ECHConfigBody::Known(c) => Some(c.kem_id),
            ech_config::ECHConfigBody::Unknown(_) => None,
        }
    }
}

/// Outcome of a single `enable_from_pem`/`enable_from_buffer` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadOutcome {
    /// No entry existed for this source; one was appended.
    Added,
    /// An entry existed and was replaced in place.
    Replaced,
    /// An entry existed and its mtime (or source_id) hadn't advanced.
    Unmodified,
}

/// Server-side store of enabled ECH keys. Readers take a cheap snapshot
/// under a read lock; `enable_from_pem`/`enable_from_buffer`/`flush_keys`
/// take the write lock — matching the single-writer model in the
/// concurrency section.
#[derive(Default)]
pub struct ServerConfigStore {
    entries: RwLock<Vec<ServerEchKey>>,
}

/// Reads the private-key and `ECHCONFIG` PEM blocks out of a byte buffer.
/// Kept as a free function (rather than a method) so tests can construct
/// PEM bytes without going through the filesystem.
fn parse_key_and_config(bytes: &[u8]) -> Result<(Vec<u8>, ech_config::ECHConfig, Vec<u8>), EchError> {
    let blocks = pem::parse_many(bytes).map_err(|_| EchError::MalformedPem("not valid PEM"))?;

    let private_key = blocks
        .iter()
        .find(|b| b.tag() == "PRIVATE KEY")
        .map(|b| b.contents().to_vec())
        .ok_or(EchError::MalformedPem("missing PRIVATE KEY block"))?;

    let config_bytes = blocks
        .iter()
        .find(|b| b.tag() == "ECHCONFIG")
        .map(|b| b.contents().to_vec())
        .ok_or(EchError::MalformedPem("missing ECHCONFIG block"))?;

    let (list, _leftover) = ECHConfigList::parse(&config_bytes).map_err(EchError::from)?;
    let config = list
        .configs()
        .first()
        .cloned()
        .ok_or(EchError::MalformedPem("ECHCONFIG block was empty"))?;
    let config_encoding = list.exact_encoding(&config).to_vec();

    Ok((private_key, config, config_encoding))
}

fn now_unix() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

fn mtime_unix(meta: &fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl ServerConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes a cheap read-locked clone of the current entries, for use at
    /// handshake start so a concurrent reload doesn't block decryption.
    pub fn snapshot(&self) -> Arc<[ServerEchKey]> {
        let guard = self.entries.read().expect("ECH config store lock poisoned");
        Arc::from(guard.clone().into_boxed_slice())
    }

    /// Reads one private key and `ECHCONFIG` PEM block from `path`.
    /// Returns `Ok(Added/Replaced/Unmodified)`, or `Err(FileMissing)` if
    /// `path` does not exist (not fatal — the caller may retry later).
    pub fn enable_from_pem(&self, path: &Path) -> Result<ReloadOutcome, EchError> {
        let meta = fs::metadata(path).map_err(|_| EchError::FileMissing(path.to_path_buf()))?;
        let mtime = mtime_unix(&meta);

        let mut guard = self.entries.write().expect("ECH config store lock poisoned");
        if let Some(existing) = guard.iter().find(|e| e.matches_path(path)) {
            if let Source::Pem { mtime: existing_mtime, .. } = &existing.source {
                if mtime <= *existing_mtime {
                    return Ok(ReloadOutcome::Unmodified);
                }
            }
        }

        let bytes = fs::read(path).map_err(|_| EchError::FileMissing(path.to_path_buf()))?;
        let (private_key, config, config_encoding) = parse_key_and_config(&bytes)?;
        let entry = ServerEchKey {
            config,
            config_encoding,
            private_key,
            load_time: now_unix(),
            source_id: path.display().to_string(),
            source: Source::Pem { path: path.to_path_buf(), mtime },
        };

        if let Some(slot) = guard.iter_mut().find(|e| e.matches_path(path)) {
            *slot = entry;
            Ok(ReloadOutcome::Replaced)
        } else {
            guard.push(entry);
            Ok(ReloadOutcome::Added)
        }
    }

    /// Parses `bytes` as a combined PEM buffer and enables it under a
    /// `source_id` derived from `SHA-256(bytes)` (uppercase hex). Two
    /// calls with identical bytes are idempotent.
    pub fn enable_from_buffer(&self, bytes: &[u8]) -> Result<ReloadOutcome, EchError> {
        let digest = sha2::Sha256::digest(bytes);
        let source_id = hex::encode_upper(digest);

        let mut guard = self.entries.write().expect("ECH config store lock poisoned");
        if guard.iter().any(|e| e.source == Source::Buffer && e.source_id == source_id) {
            return Ok(ReloadOutcome::Unmodified);
        }

        let (private_key, config, config_encoding) = parse_key_and_config(bytes)?;
        guard.push(ServerEchKey {
            config,
            config_encoding,
            private_key,
            load_time: now_unix(),
            source_id,
            source: Source::Buffer,
        });
        Ok(ReloadOutcome::Added)
    }

    /// Drops every entry older than `age_seconds`. `age_seconds <= 0`
    /// drops everything.
    pub fn flush_keys(&self, age_seconds: i64) {
        let mut guard = self.entries.write().expect("ECH config store lock poisoned");
        if age_seconds <= 0 {
            guard.clear();
            return;
        }
        let now = now_unix();
        let age = age_seconds as u64;
        guard.retain(|e| e.load_time + age > now);
    }

    /// Calls `enable_from_pem` for every regular file under `dir` ending
    /// in `.pem` or `.ech`, skipping anything else silently.
    pub fn read_dir(&self, dir: &Path) -> Result<(), EchError> {
        let entries = fs::read_dir(dir).map_err(EchError::from)?;
        for entry in entries {
            let entry = entry.map_err(EchError::from)?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let has_ext = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("pem") || e.eq_ignore_ascii_case("ech"))
                .unwrap_or(false);
            if !has_ext {
                continue;
            }
            match self.enable_from_pem(&path) {
                Ok(_) => {}
                Err(EchError::FileMissing(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }
}

use sha2::Digest;

/// Client-side list of decoded configs attached to a session or factory.
#[derive(Debug, Clone)]
pub struct ClientConfigStore {
    pub configs: ECHConfigList,
}

impl Default for ClientConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfigStore {
    pub fn new() -> Self {
        Self { configs: ECHConfigList::from(Vec::new()) }
    }

    /// Adds every config from a freshly decoded `ECHConfigList`.
    pub fn add_from_list(&mut self, list: ECHConfigList) {
        self.configs = list;
    }

    /// The configs with an HPKE suite this backend actually supports.
    pub fn supported(&self) -> impl Iterator<Item = &ech_config::ECHConfig> {
        self.configs.configs().iter().filter(|c| match &c.contents {
            ech_config::ECHConfigBody::Known(contents) => contents
                .cipher_suites
                .iter()
                .any(|s| crate::hpke_suite::is_supported(contents.kem_id, s.kdf_id, s.aead_id)),
            ech_config::ECHConfigBody::Unknown(_) => false,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::io::Write;

    fn sample_pem(tag_key: &str, tag_cfg: &str, config_bytes: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        let key_block = pem::Pem::new(tag_key, vec![1, 2, 3, 4]);
        let cfg_block = pem::Pem::new(tag_cfg, config_bytes.to_vec());
        write!(out, "{}", pem::encode(&key_block)).unwrap();
        write!(out, "{}", pem::encode(&cfg_block)).unwrap();
        out
    }

    fn sample_config_bytes() -> Vec<u8> {
        use ech_config::{CipherSuite, ECHConfig, ECHConfigBody, ECHConfigContents, PublicName};
        let contents = ECHConfigContents {
            config_id: 7,
            kem_id: crate::hpke_suite::KEM_DHKEM_X25519_HKDF_SHA256,
            public_key: vec![0x22; 32],
            cipher_suites: vec![CipherSuite {
                kdf_id: crate::hpke_suite::KDF_HKDF_SHA256,
                aead_id: crate::hpke_suite::AEAD_AES_128_GCM,
            }],
            maximum_name_length: 32,
            public_name: "example.com".parse::<PublicName>().unwrap(),
            extensions: Vec::new(),
        };
        let config = ECHConfig { version: 0x000a, contents: ECHConfigBody::Known(contents), encoding_start: 0, encoding_length: 0 };
        let list = ech_config::ECHConfigList::from(vec![config]);
        list.to_bytes().unwrap()
    }

    #[test]
    fn enable_from_buffer_is_idempotent() {
        let store = ServerConfigStore::new();
        let bytes = sample_pem("PRIVATE KEY", "ECHCONFIG", &sample_config_bytes());

        let first = store.enable_from_buffer(&bytes).unwrap();
        assert_eq!(first, ReloadOutcome::Added);
        let second = store.enable_from_buffer(&bytes).unwrap();
        assert_eq!(second, ReloadOutcome::Unmodified);
        assert_eq!(store.snapshot().len(), 1);
    }

    #[test]
    fn enable_from_pem_reports_file_missing() {
        let store = ServerConfigStore::new();
        let err = store.enable_from_pem(Path::new("/nonexistent/key.pem")).unwrap_err();
        assert!(matches!(err, EchError::FileMissing(_)));
    }

    #[test]
    fn flush_keys_with_nonpositive_age_drops_everything() {
        let store = ServerConfigStore::new();
        let bytes = sample_pem("PRIVATE KEY", "ECHCONFIG", &sample_config_bytes());
        store.enable_from_buffer(&bytes).unwrap();
        assert_eq!(store.snapshot().len(), 1);
        store.flush_keys(0);
        assert_eq!(store.snapshot().len(), 0);
    }
}
