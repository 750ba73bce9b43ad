//! AES-128-CFB8 stream cipher for the wire.
//!
//! When a deployment configures a pre-shared key, every byte on the wire is
//! run through this cipher as the outermost layer. CFB8 operates on
//! single-byte blocks, so frames of any length encrypt without padding and
//! partial reads stay decryptable. The IV is the key itself, matching the
//! source protocol.

use aes::cipher::{inout::InOutBuf, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use aes::Aes128;

use crate::ProtocolError;

/// Required key length in bytes.
pub const KEY_LEN: usize = 16;

pub type Aes128Cfb8Enc = cfb8::Encryptor<Aes128>;
pub type Aes128Cfb8Dec = cfb8::Decryptor<Aes128>;

/// Builds the encrypt/decrypt cipher pair for one connection.
///
/// Both directions use the same key; each side keeps independent cipher
/// state for its inbound and outbound streams.
pub fn cipher_pair(key: &[u8]) -> Result<(Aes128Cfb8Enc, Aes128Cfb8Dec), ProtocolError> {
    let enc = Aes128Cfb8Enc::new_from_slices(key, key)
        .map_err(|_| ProtocolError::BadKeyLength(key.len()))?;
    let dec = Aes128Cfb8Dec::new_from_slices(key, key)
        .map_err(|_| ProtocolError::BadKeyLength(key.len()))?;
    Ok((enc, dec))
}

/// Encrypts `data` in place, advancing the cipher state.
pub fn encrypt_in_place(cipher: &mut Aes128Cfb8Enc, data: &mut [u8]) {
    let (chunks, rest) = InOutBuf::from(data).into_chunks();
    debug_assert!(rest.is_empty());
    cipher.encrypt_blocks_inout_mut(chunks);
}

/// Decrypts `data` in place, advancing the cipher state.
pub fn decrypt_in_place(cipher: &mut Aes128Cfb8Dec, data: &mut [u8]) {
    let (chunks, rest) = InOutBuf::from(data).into_chunks();
    debug_assert!(rest.is_empty());
    cipher.decrypt_blocks_inout_mut(chunks);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_short_key() {
        assert!(matches!(
            cipher_pair(b"too short"),
            Err(ProtocolError::BadKeyLength(9))
        ));
    }

    #[test]
    fn stream_roundtrip_across_split_writes() {
        let key = [0x42u8; KEY_LEN];
        let (mut enc, mut dec) = cipher_pair(&key).unwrap();

        let plaintext = b"the quick brown fox jumps over the lazy dog".to_vec();
        let mut wire = plaintext.clone();
        // Encrypt in two uneven chunks to prove the state carries over.
        let (a, b) = wire.split_at_mut(7);
        encrypt_in_place(&mut enc, a);
        encrypt_in_place(&mut enc, b);
        assert_ne!(wire, plaintext);

        // Decrypt byte by byte.
        for byte in wire.iter_mut() {
            decrypt_in_place(&mut dec, std::slice::from_mut(byte));
        }
        assert_eq!(wire, plaintext);
    }
}
