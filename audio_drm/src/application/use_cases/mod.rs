// /////////////////////////////////////////////////////////////////////////////
// Adaptive Pipeline
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

pub mod chapter_materializer;
pub mod janitor;
pub mod stream_server;
pub mod upload_ingest;

pub use chapter_materializer::ChapterMaterializer;
pub use janitor::Janitor;
pub use stream_server::StreamServer;
pub use upload_ingest::UploadIngest;
