//! TLS material shared by the DoT and DoQ listeners.

use crate::{Result, ServerError};
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Loads a PEM certificate chain.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path)
        .map_err(|e| ServerError::Tls(format!("cannot open certificate {}: {e}", path.display())))?;
    let certs: Vec<CertificateDer<'static>> = rustls_pemfile::certs(&mut BufReader::new(file))
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| ServerError::Tls(format!("cannot parse certificates: {e}")))?;
    if certs.is_empty() {
        return Err(ServerError::Tls(format!(
            "no certificates in {}",
            path.display()
        )));
    }
    Ok(certs)
}

/// Loads a PEM private key.
pub fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path)
        .map_err(|e| ServerError::Tls(format!("cannot open key {}: {e}", path.display())))?;
    rustls_pemfile::private_key(&mut BufReader::new(file))
        .map_err(|e| ServerError::Tls(format!("cannot parse private key: {e}")))?
        .ok_or_else(|| ServerError::Tls(format!("no private key in {}", path.display())))
}

#[cfg(test)]
pub(crate) mod testing {
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Writes a throwaway self-signed certificate and key to temp files.
    pub fn self_signed() -> (NamedTempFile, NamedTempFile) {
        let rcgen::CertifiedKey { cert, key_pair } =
            rcgen::generate_simple_self_signed(vec!["localhost".into(), "127.0.0.1".into()])
                .expect("certificate generation");

        let mut cert_file = NamedTempFile::new().expect("temp cert file");
        cert_file
            .write_all(cert.pem().as_bytes())
            .expect("write cert");
        let mut key_file = NamedTempFile::new().expect("temp key file");
        key_file
            .write_all(key_pair.serialize_pem().as_bytes())
            .expect("write key");
        (cert_file, key_file)
    }

    /// Installs the process-wide crypto provider once for tests.
    pub fn install_provider() {
        let _ = rustls::crypto::ring::default_provider().install_default();
    }
}
