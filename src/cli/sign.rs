use crate::services::signature;
use anyhow::Result;
use std::io::Read;
use std::path::Path;

fn read_payload(file: Option<&Path>) -> Result<Vec<u8>> {
    match file {
        Some(path) => std::fs::read(path)
            .map_err(|e| anyhow::anyhow!("Could not read '{}': {}", path.display(), e)),
        None => {
            let mut buf = Vec::new();
            std::io::stdin().read_to_end(&mut buf)?;
            Ok(buf)
        }
    }
}

pub fn sign(secret: &str, file: Option<&Path>) -> Result<()> {
    let payload = read_payload(file)?;
    println!("{}", signature::signature_header_value(&payload, secret));
    Ok(())
}

pub fn verify(secret: &str, sig: &str, file: Option<&Path>) -> Result<()> {
    let payload = read_payload(file)?;
    if signature::verify(&payload, sig, secret) {
        println!("valid");
        Ok(())
    } else {
        anyhow::bail!("signature does not match payload")
    }
}
