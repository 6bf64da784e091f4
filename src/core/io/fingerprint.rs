use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const CHUNK_SIZE: usize = 8 * 1024;

/// `sha256:<64 hex chars>` over the full byte contents of `path`. Used purely
/// as an opaque equality token between plan target and on-disk state — never
/// interpreted semantically.
pub fn fingerprint(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("sha256:{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn deterministic_and_content_sensitive() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::write(&a, b"hello world").unwrap();
        std::fs::write(&b, b"hello world").unwrap();
        let fa1 = fingerprint(&a).unwrap();
        let fa2 = fingerprint(&a).unwrap();
        let fb = fingerprint(&b).unwrap();
        assert_eq!(fa1, fa2);
        assert_eq!(fa1, fb);
        assert_eq!(fa1.len(), "sha256:".len() + 64);

        let mut f = std::fs::OpenOptions::new().append(true).open(&b).unwrap();
        f.write_all(b"!").unwrap();
        drop(f);
        let fb2 = fingerprint(&b).unwrap();
        assert_ne!(fb, fb2);
    }
}
