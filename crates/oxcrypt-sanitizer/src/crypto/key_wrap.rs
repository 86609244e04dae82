#![forbid(unsafe_code)]

//! AES key wrapping as defined in [IETF RFC3394](https://datatracker.ietf.org/doc/html/rfc3394).
//!
//! Masterkey files store the primary and MAC keys wrapped under a
//! passphrase-derived key encryption key (KEK). Only AES-256 KEKs are supported.

use aes::Aes256;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use generic_array::{
    GenericArray,
    sequence::Concat,
    typenum::{U8, U16, U32},
};
use secrecy::{ExposeSecret, SecretBox};
use thiserror::Error;
use zeroize::Zeroize;

type U8x8 = GenericArray<u8, U8>;
type Block = GenericArray<u8, U16>;
type KeyData = GenericArray<u8, U32>;

/// IV from RFC3394 Section 2.2.3.1
const IV_3394: [u8; 8] = [0xa6; 8];

#[derive(Error, Debug)]
pub enum WrapError {
    #[error("The plaintext length is not a multiple of 64 bits per RFC3394.")]
    InvalidPlaintextLength,
}

#[derive(Error, Debug)]
pub enum UnwrapError {
    #[error("The ciphertext length is not a multiple of 64 bits per RFC3394.")]
    InvalidCiphertextLength,
    #[error("The ciphertext is shorter than the minimum of 24 bytes.")]
    CiphertextTooShort,
    #[error("The integrity check failed.")]
    InvalidIntegrityCheck,
}

/// Wraps a key using the AES key wrapping algorithm defined in RFC3394.
pub fn wrap_key(plaintext: &[u8], kek: &SecretBox<[u8; 32]>) -> Result<Vec<u8>, WrapError> {
    if plaintext.len() % 8 != 0 || plaintext.is_empty() {
        return Err(WrapError::InvalidPlaintextLength);
    }

    let mut kek = KeyData::clone_from_slice(kek.expose_secret());

    // 1) Initialize variables
    let n_blocks = plaintext.len() / 8;
    let mut integrity_check = U8x8::from(IV_3394);
    let mut registers = plaintext.to_vec();

    // 2) Calculate intermediate values
    let cipher = Aes256::new(&kek);
    kek.zeroize();

    for j in 0..6 {
        for (i, chunk) in registers.chunks_mut(8).enumerate() {
            // t starts at 1
            let t = ((n_blocks * j) + (i + 1)) as u64;

            // B = AES(K, A | R[i])
            let mut block: Block = integrity_check.concat(*U8x8::from_slice(chunk));
            cipher.encrypt_block(&mut block);

            // A = MSB(64, B) ^ t
            for (a, t_byte) in block[0..8].iter_mut().zip(t.to_be_bytes()) {
                *a ^= t_byte;
            }
            integrity_check.copy_from_slice(&block[0..8]);

            // R[i] = LSB(64, B)
            chunk.copy_from_slice(&block[8..16]);
        }
    }

    // 3) Output the results
    let mut ciphertext = integrity_check.to_vec();
    ciphertext.extend_from_slice(&registers);
    registers.zeroize();

    Ok(ciphertext)
}

/// Unwraps a key using the AES key wrapping algorithm defined in RFC3394.
///
/// A wrong KEK surfaces as `InvalidIntegrityCheck`.
pub fn unwrap_key(ciphertext: &[u8], kek: &SecretBox<[u8; 32]>) -> Result<Vec<u8>, UnwrapError> {
    if ciphertext.len() % 8 != 0 {
        return Err(UnwrapError::InvalidCiphertextLength);
    }
    if ciphertext.len() < 24 {
        return Err(UnwrapError::CiphertextTooShort);
    }

    let mut kek = KeyData::clone_from_slice(kek.expose_secret());

    // 1) Initialize variables, minus the IV block
    let n_blocks = (ciphertext.len() / 8) - 1;
    let mut integrity_check = *U8x8::from_slice(&ciphertext[0..8]);
    let mut registers = ciphertext[8..].to_vec();

    // 2) Calculate intermediate values
    let cipher = Aes256::new(&kek);
    kek.zeroize();

    for j in (0..6).rev() {
        for (i, chunk) in registers.chunks_mut(8).enumerate().rev() {
            let t = ((n_blocks * j) + (i + 1)) as u64;

            // B = AES-1(K, (A ^ t) | R[i])
            let mut a = integrity_check;
            for (a_byte, t_byte) in a.iter_mut().zip(t.to_be_bytes()) {
                *a_byte ^= t_byte;
            }
            let mut block: Block = a.concat(*U8x8::from_slice(chunk));
            cipher.decrypt_block(&mut block);

            // A = MSB(64, B)
            integrity_check.copy_from_slice(&block[0..8]);

            // R[i] = LSB(64, B)
            chunk.copy_from_slice(&block[8..16]);
        }
    }

    // 3) Output the results
    if integrity_check != U8x8::from(IV_3394) {
        registers.zeroize();
        return Err(UnwrapError::InvalidIntegrityCheck);
    }

    Ok(registers)
}

#[cfg(test)]
mod tests {
    //! Test vectors from RFC 3394 section 4

    use super::*;
    use hex_literal::hex;

    fn kek(bytes: [u8; 32]) -> SecretBox<[u8; 32]> {
        SecretBox::new(Box::new(bytes))
    }

    const KEK_256: [u8; 32] =
        hex!("000102030405060708090A0B0C0D0E0F101112131415161718191A1B1C1D1E1F");

    #[test]
    fn test_wrap_invalid_key_256_kek() {
        let key_data = hex!("00112233445566778899AABBCCDDEEFFF123");
        let result = wrap_key(&key_data, &kek(KEK_256));
        assert!(matches!(result, Err(WrapError::InvalidPlaintextLength)));
    }

    #[test]
    fn test_wrap_128_key_with_256_kek() {
        let key_data = hex!("00112233445566778899AABBCCDDEEFF");
        let ciphertext = hex!("64E8C3F9CE0F5BA2 63E9777905818A2A 93C8191E7D6E8AE7");

        let wrapped_key = wrap_key(&key_data, &kek(KEK_256)).unwrap();
        assert_eq!(&ciphertext[..], wrapped_key.as_slice());
    }

    #[test]
    fn test_unwrap_128_key_with_256_kek() {
        let key_data = hex!("00112233445566778899AABBCCDDEEFF");
        let ciphertext = hex!("64E8C3F9CE0F5BA2 63E9777905818A2A 93C8191E7D6E8AE7");

        let unwrapped_key = unwrap_key(&ciphertext, &kek(KEK_256)).unwrap();
        assert_eq!(&key_data[..], unwrapped_key.as_slice());
    }

    #[test]
    fn test_wrap_192_key_with_256_kek() {
        let key_data = hex!("00112233445566778899AABBCCDDEEFF0001020304050607");
        let ciphertext =
            hex!("A8F9BC1612C68B3F F6E6F4FBE30E71E4 769C8B80A32CB895 8CD5D17D6B254DA1");

        let wrapped_key = wrap_key(&key_data, &kek(KEK_256)).unwrap();
        assert_eq!(&ciphertext[..], wrapped_key.as_slice());
    }

    #[test]
    fn test_unwrap_invalid_length_with_256_kek() {
        let ciphertext = hex!("A8F9BC1612C68B3F F6E6F4FBE30E");
        let result = unwrap_key(&ciphertext, &kek(KEK_256));
        assert!(matches!(result, Err(UnwrapError::InvalidCiphertextLength)));
    }

    #[test]
    fn test_unwrap_too_short() {
        let ciphertext = hex!("A8F9BC1612C68B3F F6E6F4FBE30E71E4");
        let result = unwrap_key(&ciphertext, &kek(KEK_256));
        assert!(matches!(result, Err(UnwrapError::CiphertextTooShort)));
    }

    #[test]
    fn test_unwrap_192_key_with_wrong_kek() {
        let wrong = hex!("36b0144a13d0b5c1950c435762ff47789ab64258763f6f980f66dc00c11697cd");
        let ciphertext =
            hex!("A8F9BC1612C68B3F F6E6F4FBE30E71E4 769C8B80A32CB895 8CD5D17D6B254DA1");

        let result = unwrap_key(&ciphertext, &kek(wrong));
        assert!(matches!(result, Err(UnwrapError::InvalidIntegrityCheck)));
    }

    #[test]
    fn test_wrap_256_key_with_256_kek() {
        let key_data = hex!("00112233445566778899AABBCCDDEEFF000102030405060708090A0B0C0D0E0F");
        let ciphertext = hex!(
            "28C9F404C4B810F4 CBCCB35CFB87F826 3F5786E2D80ED326 CBC7F0E71A99F43B FB988B9B7A02DD21"
        );

        let wrapped_key = wrap_key(&key_data, &kek(KEK_256)).unwrap();
        assert_eq!(&ciphertext[..], wrapped_key.as_slice());

        let unwrapped_key = unwrap_key(&ciphertext, &kek(KEK_256)).unwrap();
        assert_eq!(&key_data[..], unwrapped_key.as_slice());
    }
}
