//! AES-ECB key establishment and bulk payload encryption (component C2).
//!
//! Two handshake modes are supported, selected by the peer's declared
//! `EncryptionType` on `OpenSession`. Each direction (inbound/outbound) is
//! activated exactly once; re-activation is rejected.

use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use cipher::generic_array::GenericArray;
use rand::RngCore;

use crate::error::WireError;

const BLOCK: usize = 16;

/// Which handshake variant the peer's `OpenSession` declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionType {
    Type1,
    Type2,
}

/// Turn an 8-digit (Type 1) or 32-hex-digit (Type 2) access-code string into
/// a 16-byte AES key by quadruple-concatenation (Type 1) or direct hex
/// decode (Type 2).
pub fn key_from_digits_quadrupled(digits: &str) -> Result<[u8; 16], WireError> {
    if digits.len() != 8 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(WireError::Encoding(format!(
            "expected an 8-digit access/integration code, got {:?}",
            digits
        )));
    }
    let hex = digits.repeat(4);
    hex_to_key(&hex)
}

/// Parse a 32-hex-digit Type 2 access code into a 16-byte key.
pub fn key_from_hex32(hex: &str) -> Result<[u8; 16], WireError> {
    if hex.len() != 32 {
        return Err(WireError::Encoding(format!(
            "expected a 32-hex-digit access code, got length {}",
            hex.len()
        )));
    }
    hex_to_key(hex)
}

fn hex_to_key(hex: &str) -> Result<[u8; 16], WireError> {
    let mut key = [0u8; 16];
    for (i, chunk) in hex.as_bytes().chunks(2).enumerate() {
        let byte_str = std::str::from_utf8(chunk).unwrap();
        key[i] = u8::from_str_radix(byte_str, 16)
            .map_err(|_| WireError::Encoding(format!("invalid hex digits in {:?}", hex)))?;
    }
    Ok(key)
}

/// Encrypt `data` under AES-128-ECB, zero-padding to a block boundary.
pub fn ecb_encrypt(key: &[u8; 16], data: &[u8]) -> Vec<u8> {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut padded = data.to_vec();
    let rem = padded.len() % BLOCK;
    if rem != 0 {
        padded.resize(padded.len() + (BLOCK - rem), 0);
    }
    for block in padded.chunks_mut(BLOCK) {
        let ga = GenericArray::from_mut_slice(block);
        cipher.encrypt_block(ga);
    }
    padded
}

/// Decrypt `data` (must be a multiple of 16 bytes) under AES-128-ECB.
pub fn ecb_decrypt(key: &[u8; 16], data: &[u8]) -> Result<Vec<u8>, WireError> {
    if data.len() % BLOCK != 0 {
        return Err(WireError::CryptoCheck(
            "ciphertext length is not a multiple of the AES block size".to_owned(),
        ));
    }
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut out = data.to_vec();
    for block in out.chunks_mut(BLOCK) {
        let ga = GenericArray::from_mut_slice(block);
        cipher.decrypt_block(ga);
    }
    Ok(out)
}

/// Owns the per-direction AES keys for one session. Plaintext passes through
/// unmodified until the corresponding direction is activated.
#[derive(Debug, Default)]
pub struct EncryptionHandler {
    outbound_key: Option<[u8; 16]>,
    inbound_key: Option<[u8; 16]>,
}

impl EncryptionHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outbound_active(&self) -> bool {
        self.outbound_key.is_some()
    }

    pub fn inbound_active(&self) -> bool {
        self.inbound_key.is_some()
    }

    /// Type 1: derive the outbound key from the peer's 48-byte initializer.
    ///
    /// `identifier_key` is keyed by the 8-digit integration identifier.
    pub fn configure_outbound_type1(
        &mut self,
        identifier_key: &[u8; 16],
        initializer: &[u8; 48],
    ) -> Result<(), WireError> {
        if self.outbound_key.is_some() {
            return Err(WireError::CryptoCheck(
                "outbound encryption already activated".to_owned(),
            ));
        }
        let check = &initializer[0..16];
        let cipher = &initializer[16..48];
        let plaintext = ecb_decrypt(identifier_key, cipher)?;
        let even: Vec<u8> = plaintext.iter().step_by(2).copied().collect();
        let odd: Vec<u8> = plaintext.iter().skip(1).step_by(2).copied().collect();
        if even != check {
            return Err(WireError::CryptoCheck(
                "Type 1 initializer check bytes did not match".to_owned(),
            ));
        }
        let mut key = [0u8; 16];
        key.copy_from_slice(&odd);
        self.outbound_key = Some(key);
        Ok(())
    }

    /// Type 1: generate our own inbound key and the 48-byte initializer to
    /// send back to the peer, keyed by the 8-digit access code.
    pub fn configure_inbound_type1(
        &mut self,
        access_code_key: &[u8; 16],
    ) -> Result<[u8; 48], WireError> {
        if self.inbound_key.is_some() {
            return Err(WireError::CryptoCheck(
                "inbound encryption already activated".to_owned(),
            ));
        }
        let mut random = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut random);
        let check: Vec<u8> = random.iter().step_by(2).copied().collect();
        let key_bytes: Vec<u8> = random.iter().skip(1).step_by(2).copied().collect();
        let mut key = [0u8; 16];
        key.copy_from_slice(&key_bytes);
        self.inbound_key = Some(key);

        let cipher = ecb_encrypt(access_code_key, &random);
        let mut initializer = [0u8; 48];
        initializer[0..16].copy_from_slice(&check);
        initializer[16..48].copy_from_slice(&cipher);
        Ok(initializer)
    }

    /// Type 2: derive the outbound key by encrypting the peer's 16-byte
    /// initializer under the shared access-code key.
    pub fn configure_outbound_type2(
        &mut self,
        access_code_key: &[u8; 16],
        peer_initializer: &[u8; 16],
    ) -> Result<(), WireError> {
        if self.outbound_key.is_some() {
            return Err(WireError::CryptoCheck(
                "outbound encryption already activated".to_owned(),
            ));
        }
        let key_bytes = ecb_encrypt(access_code_key, peer_initializer);
        let mut key = [0u8; 16];
        key.copy_from_slice(&key_bytes[..16]);
        self.outbound_key = Some(key);
        Ok(())
    }

    /// Type 2: generate our own 16-byte initializer and derive the inbound
    /// key by encrypting it under the shared access-code key.
    pub fn configure_inbound_type2(
        &mut self,
        access_code_key: &[u8; 16],
    ) -> Result<[u8; 16], WireError> {
        if self.inbound_key.is_some() {
            return Err(WireError::CryptoCheck(
                "inbound encryption already activated".to_owned(),
            ));
        }
        let mut local_initializer = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut local_initializer);
        let key_bytes = ecb_encrypt(access_code_key, &local_initializer);
        let mut key = [0u8; 16];
        key.copy_from_slice(&key_bytes[..16]);
        self.inbound_key = Some(key);
        Ok(local_initializer)
    }

    /// Encrypt an outbound payload. Passes through unmodified if the
    /// outbound direction has not yet been activated.
    pub fn encrypt(&self, payload: &[u8]) -> Vec<u8> {
        match &self.outbound_key {
            Some(key) => ecb_encrypt(key, payload),
            None => payload.to_vec(),
        }
    }

    /// Decrypt an inbound payload. Passes through unmodified if the inbound
    /// direction has not yet been activated.
    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>, WireError> {
        match &self.inbound_key {
            Some(key) => ecb_decrypt(key, payload),
            None => Ok(payload.to_vec()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecb_round_trip() {
        let key = [0x42u8; 16];
        let plaintext = b"0123456789abcdef0123456789abcdef";
        let ct = ecb_encrypt(&key, plaintext);
        let pt = ecb_decrypt(&key, &ct).unwrap();
        assert_eq!(&pt[..plaintext.len()], plaintext);
    }

    #[test]
    fn zero_padding_rounds_up_to_block_size() {
        let key = [0x01u8; 16];
        let ct = ecb_encrypt(&key, &[1, 2, 3]);
        assert_eq!(ct.len(), 16);
    }

    #[test]
    fn type2_handshake_round_trip() {
        let access_code_key = key_from_hex32("0123456789abcdef0123456789abcdef").unwrap();

        let mut server = EncryptionHandler::new();
        let server_initializer = server.configure_inbound_type2(&access_code_key).unwrap();

        let mut client = EncryptionHandler::new();
        client
            .configure_outbound_type2(&access_code_key, &server_initializer)
            .unwrap();

        // Client -> server encrypted message decrypts correctly.
        let msg = b"hello panel bridge!!!!!!!!!!!!!!"; // 33 bytes, will zero pad
        let ct = client.encrypt(msg);
        let pt = server.decrypt(&ct).unwrap();
        assert_eq!(&pt[..msg.len()], msg);
    }

    #[test]
    fn type1_handshake_round_trip() {
        let access_code_key = key_from_digits_quadrupled("12345678").unwrap();
        let identifier_key = key_from_digits_quadrupled("87654321").unwrap();

        // Peer (panel) generates its own outbound initializer the way our
        // inbound activation does, so we can validate the receiving side.
        let mut panel_side = EncryptionHandler::new();
        let initializer = panel_side.configure_inbound_type1(&identifier_key).unwrap();

        let mut server = EncryptionHandler::new();
        server
            .configure_outbound_type1(&identifier_key, &initializer)
            .unwrap();

        // Now the server activates its own inbound key and the panel mirrors it.
        let mut server2 = EncryptionHandler::new();
        let server_initializer = server2.configure_inbound_type1(&access_code_key).unwrap();
        let mut panel_side2 = EncryptionHandler::new();
        panel_side2
            .configure_outbound_type1(&access_code_key, &server_initializer)
            .unwrap();

        let msg = b"arm away partition 1";
        let ct = panel_side2.encrypt(msg);
        let pt = server2.decrypt(&ct).unwrap();
        assert_eq!(&pt[..msg.len()], msg);
    }

    #[test]
    fn type1_check_mismatch_is_rejected() {
        let identifier_key = key_from_digits_quadrupled("11111111").unwrap();
        let wrong_key = key_from_digits_quadrupled("22222222").unwrap();
        let mut panel_side = EncryptionHandler::new();
        let initializer = panel_side.configure_inbound_type1(&wrong_key).unwrap();

        let mut server = EncryptionHandler::new();
        let err = server
            .configure_outbound_type1(&identifier_key, &initializer)
            .unwrap_err();
        assert!(matches!(err, WireError::CryptoCheck(_)));
    }

    #[test]
    fn reactivation_is_rejected() {
        let key = key_from_hex32("00112233445566778899aabbccddeeff".get(0..32).unwrap()).unwrap();
        let mut handler = EncryptionHandler::new();
        let init1 = handler.configure_inbound_type2(&key).unwrap();
        let _ = init1;
        let err = handler.configure_inbound_type2(&key).unwrap_err();
        assert!(matches!(err, WireError::CryptoCheck(_)));
    }
}
