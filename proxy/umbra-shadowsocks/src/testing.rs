// Copyright the Umbra Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Helpers for acting as an honest client in tests.

use crate::{
    cipher::CipherSuite,
    crypto::awslc::{derive_subkey, Sealer, NONCE_LEN},
    user::User,
    validator::Command,
};

pub fn init_tracing() {
    use std::sync::Once;

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

/// A user with a freshly generated master key.
pub fn user(email: &str, cipher: CipherSuite) -> User {
    let mut key = vec![0u8; cipher.key_len()];
    aws_lc_rs::rand::fill(&mut key).unwrap();
    User::new(email, key, cipher)
}

/// First bytes of a request as `user`'s client would send them.
pub fn client_hello(user: &User, payload: &[u8], command: Command) -> Vec<u8> {
    let mut iv = vec![0u8; user.cipher().iv_len()];
    aws_lc_rs::rand::fill(&mut iv).unwrap();
    client_hello_with_iv(user, &iv, payload, command)
}

/// Like [`client_hello`] with a caller-chosen IV, for exercising replays.
pub fn client_hello_with_iv(
    user: &User,
    iv: &[u8],
    payload: &[u8],
    command: Command,
) -> Vec<u8> {
    let suite = user.cipher();
    let mut subkey = vec![0u8; suite.key_len()];
    derive_subkey(user.key(), iv, &mut subkey);
    let sealer = Sealer::new(suite.algorithm().unwrap(), &subkey).unwrap();

    let mut out = iv.to_vec();
    match command {
        Command::Tcp => {
            // length frame under nonce 0, first payload chunk under nonce 1
            let mut frame = (payload.len() as u16).to_be_bytes().to_vec();
            sealer.seal_append(nonce_for(0), &mut frame);
            out.extend_from_slice(&frame);

            let mut chunk = payload.to_vec();
            sealer.seal_append(nonce_for(1), &mut chunk);
            out.extend_from_slice(&chunk);
        }
        Command::Udp => {
            let mut chunk = payload.to_vec();
            sealer.seal_append(nonce_for(0), &mut chunk);
            out.extend_from_slice(&chunk);
        }
    }
    out
}

/// The little-endian counting nonce Shadowsocks uses for stream chunks.
pub fn nonce_for(counter: u64) -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    nonce[..8].copy_from_slice(&counter.to_le_bytes());
    nonce
}
