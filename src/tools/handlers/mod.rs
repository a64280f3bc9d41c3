// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tool handler implementations.
//!
//! Every filesystem handler holds the [`OutputRoot`](crate::tools::OutputRoot)
//! and resolves its `path` argument through it before touching the disk.

mod append_file;
mod create_directory;
mod list_dir;
mod read_file;
mod validate_python;
mod write_file;

pub use append_file::AppendFileHandler;
pub use create_directory::CreateDirectoryHandler;
pub use list_dir::ListDirHandler;
pub use read_file::ReadFileHandler;
pub use validate_python::{check_python_syntax, SyntaxCheck, ValidatePythonHandler};
pub use write_file::WriteFileHandler;
