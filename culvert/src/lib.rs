// Copyright 2026 The Culvert Project
// SPDX-License-Identifier: Apache-2.0

pub mod client;
pub mod config;
pub mod relay;
pub mod stream;
