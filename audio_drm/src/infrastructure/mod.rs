// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Infrastructure: adapters implementing the domain ports, the sqlite
//! repository, the runtime resource governor, config loading and metrics.
//! Nothing above this layer (application, presentation) reaches past it
//! into a concrete crate like `sqlx` or `aes-gcm` directly.

pub mod adapters;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod repositories;
pub mod runtime;
