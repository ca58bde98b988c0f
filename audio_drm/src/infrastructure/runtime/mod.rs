// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! Process-wide runtime singletons: the Memory Governor sampler.

pub mod resource_manager;

pub use resource_manager::{MemoryBandThresholds, SysinfoMemoryGovernor};
