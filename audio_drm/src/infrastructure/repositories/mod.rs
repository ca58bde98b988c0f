// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! The sqlite-backed `Repository` and the schema/migration helpers it sits
//! on top of.

pub mod schema;
pub mod sqlite_repository;

pub use sqlite_repository::SqliteRepository;
