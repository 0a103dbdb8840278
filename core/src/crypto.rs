// Copyright 2026 The hidefs Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! AES-128-CBC, no padding, fresh IV per write. There is deliberately no authentication
//! tag: decrypting a slot under the wrong key must yield plausible random-looking
//! plaintext, not a detectable failure.

use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;

use crate::consts::{IV_SIZE, KEY_SIZE, LOGICAL_BLOCK_SIZE, PHYSICAL_BLOCK_SIZE};

type Enc = cbc::Encryptor<Aes128>;
type Dec = cbc::Decryptor<Aes128>;

/// Encrypts `plaintext` (exactly [`LOGICAL_BLOCK_SIZE`] bytes) into a fresh physical
/// slot: a random 16-byte IV followed by the ciphertext.
pub fn encrypt_slot(key: &[u8; KEY_SIZE], plaintext: &[u8], rng: &mut dyn RngCore) -> Vec<u8> {
    assert_eq!(plaintext.len(), LOGICAL_BLOCK_SIZE as usize);

    let mut iv = [0u8; IV_SIZE as usize];
    rng.fill_bytes(&mut iv);

    let mut out = Vec::with_capacity(PHYSICAL_BLOCK_SIZE as usize);
    out.extend_from_slice(&iv);
    out.extend_from_slice(plaintext);
    let (iv_part, body) = out.split_at_mut(IV_SIZE as usize);
    Enc::new(key.into(), (&*iv_part).into())
        .encrypt_padded_mut::<NoPadding>(body, plaintext.len())
        .expect("block-aligned plaintext can't fail to pad");
    out
}

/// Decrypts a physical slot (exactly [`PHYSICAL_BLOCK_SIZE`] bytes) with `key`.
/// Always succeeds and always returns [`LOGICAL_BLOCK_SIZE`] bytes, whether or not
/// `key` is the one the slot was actually written with.
pub fn decrypt_slot(key: &[u8; KEY_SIZE], slot: &[u8]) -> Vec<u8> {
    assert_eq!(slot.len(), PHYSICAL_BLOCK_SIZE as usize);

    let (iv, ciphertext) = slot.split_at(IV_SIZE as usize);
    let mut buf = ciphertext.to_vec();
    let len = Dec::new(key.into(), iv.into())
        .decrypt_padded_mut::<NoPadding>(&mut buf)
        .expect("NoPadding over a whole number of blocks never fails")
        .len();
    buf.truncate(len);
    buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    #[test]
    fn round_trips() {
        let key = [7u8; KEY_SIZE];
        let plaintext = vec![0xAAu8; LOGICAL_BLOCK_SIZE as usize];
        let mut rng = OsRng;
        let slot = encrypt_slot(&key, &plaintext, &mut rng);
        assert_eq!(slot.len(), PHYSICAL_BLOCK_SIZE as usize);
        let recovered = decrypt_slot(&key, &slot);
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn wrong_key_does_not_panic_and_differs() {
        let key = [1u8; KEY_SIZE];
        let wrong = [2u8; KEY_SIZE];
        let plaintext = vec![0x11u8; LOGICAL_BLOCK_SIZE as usize];
        let slot = encrypt_slot(&key, &plaintext, &mut OsRng);
        let recovered = decrypt_slot(&wrong, &slot);
        assert_eq!(recovered.len(), LOGICAL_BLOCK_SIZE as usize);
        assert_ne!(recovered, plaintext);
    }

    #[test]
    fn fresh_iv_each_call() {
        let key = [3u8; KEY_SIZE];
        let plaintext = vec![0x55u8; LOGICAL_BLOCK_SIZE as usize];
        let a = encrypt_slot(&key, &plaintext, &mut OsRng);
        let b = encrypt_slot(&key, &plaintext, &mut OsRng);
        assert_ne!(a, b);
    }
}
