// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image boundary: decode, colour conversion, downscaling, JPEG round trips,
// and PNG encoding over the `image` crate.

pub mod codec;

pub use codec::decode;
