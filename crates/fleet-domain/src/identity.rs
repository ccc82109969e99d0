//! Identidades validadas: `Fqdn` del nodo emisor y `ContentHash` del reporte.
//!
//! Ambas terminan formando parte de una ruta en disco
//! (`<report_root>/<fqdn>/<hash>`), así que la validación es estricta: un
//! cliente no confiable no debe poder escapar del directorio de reportes.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::DomainError;

const MAX_FQDN_LEN: usize = 255;
const MAX_HASH_LEN: usize = 128;

/// Identidad del nodo (clave natural de `hosts`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Fqdn(String);

impl Fqdn {
    /// Valida y normaliza (trim) un fqdn recibido del cliente.
    ///
    /// Rechaza: vacío, más de 255 bytes, `.`/`..`, separadores de ruta,
    /// espacios y caracteres de control.
    pub fn new(raw: &str) -> Result<Self, DomainError> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(DomainError::ValidationError("fqdn vacío".to_string()));
        }
        if value.len() > MAX_FQDN_LEN {
            return Err(DomainError::ValidationError(format!("fqdn excede {MAX_FQDN_LEN} bytes")));
        }
        if value == "." || value == ".." {
            return Err(DomainError::ValidationError(format!("fqdn reservado: {value}")));
        }
        if let Some(c) = value.chars()
                              .find(|c| *c == '/' || *c == '\\' || c.is_control() || c.is_whitespace())
        {
            return Err(DomainError::ValidationError(format!("fqdn con carácter no permitido: {c:?}")));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Fqdn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl AsRef<str> for Fqdn {
    fn as_ref(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Fqdn {
    type Error = DomainError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Fqdn::new(&value) }
}

impl From<Fqdn> for String {
    fn from(value: Fqdn) -> Self { value.0 }
}

/// Huella determinista (hex en minúsculas) de los bytes crudos de un reporte.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash(String);

impl ContentHash {
    /// SHA-256 de los bytes crudos.
    pub fn of(bytes: &[u8]) -> Self { Self(hex::encode(Sha256::digest(bytes))) }

    /// Acepta un hash provisto por el parser si es hex válido.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let value = raw.trim();
        if value.is_empty() || value.len() > MAX_HASH_LEN {
            return Err(DomainError::ValidationError(format!("longitud de hash inválida: {}", value.len())));
        }
        if !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DomainError::ValidationError("hash no hexadecimal".to_string()));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl TryFrom<String> for ContentHash {
    type Error = DomainError;
    fn try_from(value: String) -> Result<Self, Self::Error> { ContentHash::parse(&value) }
}

impl From<ContentHash> for String {
    fn from(value: ContentHash) -> Self { value.0 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fqdn_accepts_dotted_names_and_trims() {
        let fqdn = Fqdn::new("  web01.example.com\n").unwrap();
        assert_eq!(fqdn.as_str(), "web01.example.com");
    }

    #[test]
    fn fqdn_rejects_path_escapes() {
        for bad in ["", "..", ".", "a/b", "..\\x", "web 01", "nul\0byte"] {
            assert!(Fqdn::new(bad).is_err(), "debería rechazar {bad:?}");
        }
    }

    #[test]
    fn fqdn_rejects_overlong_names() {
        let long = "a".repeat(256);
        assert!(Fqdn::new(&long).is_err());
        assert!(Fqdn::new(&long[..255]).is_ok());
    }

    #[test]
    fn content_hash_is_sha256_hex() {
        let h = ContentHash::of(b"abc");
        assert_eq!(h.as_str(), "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad");
    }

    #[test]
    fn content_hash_parse_normalizes_case_and_rejects_non_hex() {
        assert_eq!(ContentHash::parse("ABCDEF01").unwrap().as_str(), "abcdef01");
        assert!(ContentHash::parse("../etc").is_err());
        assert!(ContentHash::parse("").is_err());
    }
}
