// Copyright the Umbra Authors. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

pub mod awslc;

pub use awslc::Opener;

pub mod open {
    pub type Result<T = ()> = core::result::Result<T, Error>;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
    pub enum Error {
        /// The ciphertext did not authenticate under the candidate subkey.
        ///
        /// During a lookup this is the normal "not the sender" signal and is
        /// never surfaced past the engine.
        #[error("invalid tag")]
        InvalidTag,
    }
}
