// ── Content identifiers ──
//
// Syntactic plausibility only: the engine never decodes multihashes, it
// just refuses strings that no gateway could possibly resolve.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

const BASE58_ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
const BASE32_ALPHABET: &str = "abcdefghijklmnopqrstuvwxyz234567";

/// A syntactically plausible IPFS content identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cid(String);

impl Cid {
    /// Accepts CIDv0 (`Qm…`, 46 base58 characters) and CIDv1 in base32
    /// (`b…`) or base58btc (`z…`) multibase.
    pub fn parse(input: &str) -> Result<Self, CoreError> {
        let s = input.trim();
        let invalid = |reason: &str| CoreError::InvalidCid {
            cid: s.to_owned(),
            reason: reason.to_owned(),
        };

        if s.is_empty() {
            return Err(invalid("empty"));
        }

        if s.starts_with("Qm") {
            if s.len() != 46 {
                return Err(invalid("CIDv0 must be 46 characters"));
            }
            if !s.chars().all(|c| BASE58_ALPHABET.contains(c)) {
                return Err(invalid("CIDv0 must be base58btc"));
            }
            return Ok(Self(s.to_owned()));
        }

        let Some(prefix) = s.chars().next() else {
            return Err(invalid("empty"));
        };
        let body = &s[prefix.len_utf8()..];
        if body.len() < 7 {
            return Err(invalid("too short"));
        }
        let alphabet = match prefix {
            'b' => BASE32_ALPHABET,
            'z' => BASE58_ALPHABET,
            _ => return Err(invalid("unsupported multibase prefix")),
        };
        if !body.chars().all(|c| alphabet.contains(c)) {
            return Err(invalid("invalid character for multibase encoding"));
        }
        Ok(Self(s.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Cid {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Cid {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Cid> for String {
    fn from(cid: Cid) -> Self {
        cid.0
    }
}

impl AsRef<str> for Cid {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
