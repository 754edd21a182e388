use aes::Aes128;
use cipher::{
    BlockDecrypt, BlockDecryptMut, BlockEncrypt, BlockEncryptMut, KeyInit, KeyIvInit,
    block_padding::{Iso7816, UnpadError},
    generic_array::GenericArray,
};
use bytes::{Bytes, BytesMut};
use cmac::{Cmac, Mac};
use subtle::ConstantTimeEq;

/// AES block and key size in bytes
pub(crate) const BLOCK_SIZE: usize = 16;

/// Length of a truncated CMAC
pub(crate) const MAC_LENGTH: usize = 8;

type Encryptor = cbc::Encryptor<Aes128>;
type Decryptor = cbc::Decryptor<Aes128>;

/// Decrypt one AES block without chaining.
///
/// # Arguments
///
/// * `key` - The AES-128 key.
/// * `block` - Exactly one ciphertext block.
///
/// # Returns
///
/// The plaintext block.
pub(crate) fn decrypt_block(key: &[u8; BLOCK_SIZE], block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut out = GenericArray::clone_from_slice(block);
    cipher.decrypt_block(&mut out);
    out.into()
}

/// Encrypt one AES block without chaining.
///
/// # Arguments
///
/// * `key` - The AES-128 key.
/// * `block` - Exactly one plaintext block.
///
/// # Returns
///
/// The ciphertext block.
pub(crate) fn encrypt_block(key: &[u8; BLOCK_SIZE], block: &[u8; BLOCK_SIZE]) -> [u8; BLOCK_SIZE] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut out = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut out);
    out.into()
}

/// Encrypt data with AES-CBC, padding it in ISO 7816 format.
///
/// # Arguments
///
/// * `data` - The data to encrypt.
/// * `key` - The key to use for encryption.
/// * `iv` - The IV to use for encryption.
///
/// # Returns
///
/// The encrypted data as a `Bytes`.
pub(crate) fn encrypt_data(data: &[u8], key: &[u8; BLOCK_SIZE], iv: &[u8; BLOCK_SIZE]) -> Bytes {
    let mut buf = data.to_vec();
    pad(&mut buf);

    let mut encryptor = Encryptor::new(key.into(), iv.into());
    for block in buf.chunks_exact_mut(BLOCK_SIZE) {
        encryptor.encrypt_block_mut(GenericArray::from_mut_slice(block));
    }
    Bytes::from(buf)
}

/// Decrypt data with AES-CBC assuming the data is padded in ISO 7816 format.
///
/// # Arguments
///
/// * `data` - The data to decrypt.
/// * `key` - The key to use for decryption.
/// * `iv` - The IV to use for decryption.
///
/// # Returns
///
/// The decrypted data as a `Bytes`.
pub(crate) fn decrypt_data(
    data: &[u8],
    key: &[u8; BLOCK_SIZE],
    iv: &[u8; BLOCK_SIZE],
) -> Result<Bytes, UnpadError> {
    if data.is_empty() || data.len() % BLOCK_SIZE != 0 {
        return Err(UnpadError);
    }
    let mut buf = BytesMut::from(data);
    let decrypted = Decryptor::new(key.into(), iv.into()).decrypt_padded_mut::<Iso7816>(&mut buf)?;
    let len = decrypted.len();
    buf.truncate(len);
    Ok(buf.freeze())
}

/// Calculate the AES-CMAC of the given data truncated to 8 bytes.
///
/// # Arguments
///
/// * `key` - The MAC key.
/// * `data` - The data to authenticate, used as is without extra padding.
///
/// # Returns
///
/// The leftmost 8 bytes of the CMAC.
pub(crate) fn calculate_mac(key: &[u8; BLOCK_SIZE], data: &[u8]) -> [u8; MAC_LENGTH] {
    let mut mac = <Cmac<Aes128> as KeyInit>::new(key.into());
    mac.update(data);
    let full = mac.finalize().into_bytes();

    let mut out = [0u8; MAC_LENGTH];
    out.copy_from_slice(&full[..MAC_LENGTH]);
    out
}

/// Compare two MACs in constant time
pub(crate) fn mac_eq(lhs: &[u8], rhs: &[u8]) -> bool {
    lhs.ct_eq(rhs).into()
}

/// Append ISO 7816 padding (`80 00 ..`) up to the next block boundary
pub(crate) fn pad(data: &mut Vec<u8>) {
    data.push(0x80);
    while data.len() % BLOCK_SIZE != 0 {
        data.push(0x00);
    }
}
