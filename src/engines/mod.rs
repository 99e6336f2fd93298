// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod attempt_engine;
pub mod chromium;
pub mod extractor;
pub mod fingerprint;
pub mod session_limiter;
pub mod traits;
