//! Backend registry and query dispatch.
//!
//! A backend is either a flat-file database (with an optional TOC) or a
//! sharded binary-fuse filter. All of them are opened once at startup and
//! shared read-only afterwards; a query is parsed into a typed needle and
//! routed here.

use crate::error::DbError;
use crate::filter::{FuseFilter16, FuseFilter8};
use crate::flat_file::FlatFileDb;
use crate::record::{decode_hex, key64};
use crate::toc::Toc;
use sha1::{Digest, Sha1};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Sha1,
    Plain,
    Ntlm,
    Sha1t64,
    Binfuse8,
    Binfuse16,
}

impl BackendKind {
    /// Parse the `<backend>` path segment of a check request.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sha1" => Some(Self::Sha1),
            "plain" => Some(Self::Plain),
            "ntlm" => Some(Self::Ntlm),
            "sha1t64" => Some(Self::Sha1t64),
            "binfuse8" => Some(Self::Binfuse8),
            "binfuse16" => Some(Self::Binfuse16),
            _ => None,
        }
    }

    /// Cache tag. `plain` shares the sha1 tag: once hashed, the needles are
    /// interchangeable.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Sha1 | Self::Plain => "sha1",
            Self::Ntlm => "ntlm",
            Self::Sha1t64 => "sha1t64",
            Self::Binfuse8 => "binfuse8",
            Self::Binfuse16 => "binfuse16",
        }
    }
}

/// A parsed query, typed by backend hash width.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Needle {
    Sha1([u8; 20]),
    Ntlm([u8; 16]),
    Key64([u8; 8]),
}

impl Needle {
    /// The raw needle bytes, used as the cache key.
    pub fn bytes(&self) -> &[u8] {
        match self {
            Self::Sha1(h) => h,
            Self::Ntlm(h) => h,
            Self::Key64(h) => h,
        }
    }

    /// XOR a salt into the low bytes. Used by `--perf-test` to defeat the
    /// cache; results become meaningless by construction.
    pub fn perturb(&mut self, salt: u64) {
        let bytes = match self {
            Self::Sha1(h) => &mut h[12..20],
            Self::Ntlm(h) => &mut h[8..16],
            Self::Key64(h) => &mut h[0..8],
        };
        for (b, s) in bytes.iter_mut().zip(salt.to_le_bytes()) {
            *b ^= s;
        }
    }
}

/// Why a query could not be answered.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("malformed query: {0}")]
    BadQuery(String),

    #[error("backend '{0}' is not configured")]
    Unavailable(&'static str),
}

/// Parse the query path segment into a needle for `kind`. Hash backends
/// expect exactly the backend's hash width in hex; `plain` hashes the
/// query text with SHA-1.
pub fn parse_query(kind: BackendKind, query: &str) -> Result<Needle, QueryError> {
    match kind {
        BackendKind::Plain => {
            let mut hasher = Sha1::new();
            hasher.update(query.as_bytes());
            Ok(Needle::Sha1(hasher.finalize().into()))
        }
        BackendKind::Sha1 => decode_hex::<20>(query)
            .map(Needle::Sha1)
            .ok_or_else(|| QueryError::BadQuery("expected 40 hex digits".into())),
        BackendKind::Ntlm => decode_hex::<16>(query)
            .map(Needle::Ntlm)
            .ok_or_else(|| QueryError::BadQuery("expected 32 hex digits".into())),
        BackendKind::Sha1t64 | BackendKind::Binfuse8 | BackendKind::Binfuse16 => {
            decode_hex::<8>(query)
                .map(Needle::Key64)
                .ok_or_else(|| QueryError::BadQuery("expected 16 hex digits".into()))
        }
    }
}

/// A flat-file database plus its optional TOC.
pub struct DbBackend<const N: usize> {
    db: FlatFileDb<N>,
    toc: Option<Toc>,
}

impl<const N: usize> DbBackend<N> {
    pub fn open(path: &PathBuf, toc_bits: Option<u8>) -> Result<Self, DbError> {
        let db = FlatFileDb::open(path)?;
        let toc = toc_bits.map(|bits| Toc::build_or_load(&db, bits)).transpose()?;
        log::info!(
            "opened {} ({} records{})",
            path.display(),
            db.len(),
            if toc.is_some() { ", toc" } else { "" }
        );
        Ok(Self { db, toc })
    }

    pub fn lookup(&self, needle: &[u8; N]) -> Option<u32> {
        match &self.toc {
            Some(toc) => toc.lookup(&self.db, needle),
            None => self.db.lookup(needle),
        }
    }

    pub fn len(&self) -> usize {
        self.db.len()
    }

    pub fn is_empty(&self) -> bool {
        self.db.is_empty()
    }
}

/// Filesystem locations of the configured backends.
#[derive(Debug, Clone, Default)]
pub struct BackendPaths {
    pub sha1_db: Option<PathBuf>,
    pub ntlm_db: Option<PathBuf>,
    pub sha1t64_db: Option<PathBuf>,
    pub binfuse8_filter: Option<PathBuf>,
    pub binfuse16_filter: Option<PathBuf>,
}

impl BackendPaths {
    pub fn any_configured(&self) -> bool {
        self.sha1_db.is_some()
            || self.ntlm_db.is_some()
            || self.sha1t64_db.is_some()
            || self.binfuse8_filter.is_some()
            || self.binfuse16_filter.is_some()
    }
}

pub struct Backends {
    pub sha1: Option<DbBackend<20>>,
    pub ntlm: Option<DbBackend<16>>,
    pub sha1t64: Option<DbBackend<8>>,
    pub binfuse8: Option<FuseFilter8>,
    pub binfuse16: Option<FuseFilter16>,
}

impl Backends {
    /// Open every configured backend, building or loading TOCs when
    /// `toc_bits` is set. Every file is validated here, before the server
    /// starts accepting requests.
    pub fn open(paths: &BackendPaths, toc_bits: Option<u8>) -> Result<Self, DbError> {
        Ok(Self {
            sha1: paths
                .sha1_db
                .as_ref()
                .map(|p| DbBackend::open(p, toc_bits))
                .transpose()?,
            ntlm: paths
                .ntlm_db
                .as_ref()
                .map(|p| DbBackend::open(p, toc_bits))
                .transpose()?,
            sha1t64: paths
                .sha1t64_db
                .as_ref()
                .map(|p| DbBackend::open(p, toc_bits))
                .transpose()?,
            binfuse8: paths
                .binfuse8_filter
                .as_ref()
                .map(|p| FuseFilter8::load(p))
                .transpose()?,
            binfuse16: paths
                .binfuse16_filter
                .as_ref()
                .map(|p| FuseFilter16::load(p))
                .transpose()?,
        })
    }

    /// Names of the configured backends, for the info page and /status.
    pub fn configured(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.sha1.is_some() {
            names.push("sha1");
            names.push("plain");
        }
        if self.ntlm.is_some() {
            names.push("ntlm");
        }
        if self.sha1t64.is_some() {
            names.push("sha1t64");
        }
        if self.binfuse8.is_some() {
            names.push("binfuse8");
        }
        if self.binfuse16.is_some() {
            names.push("binfuse16");
        }
        names
    }

    /// Route a parsed needle to its backend. Databases answer with the
    /// breach count; filters answer presence as count 1.
    pub fn lookup(&self, kind: BackendKind, needle: &Needle) -> Result<Option<u32>, QueryError> {
        match (kind, needle) {
            (BackendKind::Sha1 | BackendKind::Plain, Needle::Sha1(h)) => self
                .sha1
                .as_ref()
                .ok_or(QueryError::Unavailable("sha1"))
                .map(|b| b.lookup(h)),
            (BackendKind::Ntlm, Needle::Ntlm(h)) => self
                .ntlm
                .as_ref()
                .ok_or(QueryError::Unavailable("ntlm"))
                .map(|b| b.lookup(h)),
            (BackendKind::Sha1t64, Needle::Key64(h)) => self
                .sha1t64
                .as_ref()
                .ok_or(QueryError::Unavailable("sha1t64"))
                .map(|b| b.lookup(h)),
            (BackendKind::Binfuse8, Needle::Key64(h)) => self
                .binfuse8
                .as_ref()
                .ok_or(QueryError::Unavailable("binfuse8"))
                .map(|f| f.contains(key64(h)).then_some(1)),
            (BackendKind::Binfuse16, Needle::Key64(h)) => self
                .binfuse16
                .as_ref()
                .ok_or(QueryError::Unavailable("binfuse16"))
                .map(|f| f.contains(key64(h)).then_some(1)),
            _ => Err(QueryError::BadQuery("needle does not fit backend".into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::encode_hex;

    #[test]
    fn test_backend_parse() {
        assert_eq!(BackendKind::parse("sha1"), Some(BackendKind::Sha1));
        assert_eq!(BackendKind::parse("plain"), Some(BackendKind::Plain));
        assert_eq!(BackendKind::parse("binfuse16"), Some(BackendKind::Binfuse16));
        assert_eq!(BackendKind::parse("md5"), None);
        assert_eq!(BackendKind::parse(""), None);
    }

    #[test]
    fn test_plain_query_hashes_to_sha1() {
        // SHA1("P@ssw0rd") = 21BD12DC183F740EE76F27B78EB39C8AD972A757
        let needle = parse_query(BackendKind::Plain, "P@ssw0rd").unwrap();
        assert_eq!(
            encode_hex(needle.bytes()),
            "21BD12DC183F740EE76F27B78EB39C8AD972A757"
        );
    }

    #[test]
    fn test_hash_query_width_enforced() {
        assert!(parse_query(BackendKind::Sha1, "21BD12").is_err());
        assert!(parse_query(
            BackendKind::Ntlm,
            "21BD12DC183F740EE76F27B78EB39C8AD972A757"
        )
        .is_err());
        assert!(parse_query(BackendKind::Sha1t64, "21BD12DC183F740E").is_ok());
        assert!(parse_query(BackendKind::Binfuse8, "21BD12DC183F740E").is_ok());
    }

    #[test]
    fn test_perturb_changes_needle() {
        let mut a = parse_query(BackendKind::Plain, "P@ssw0rd").unwrap();
        let b = a.clone();
        a.perturb(1);
        assert_ne!(a, b);
    }
}
