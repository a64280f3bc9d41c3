// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Platform transport for the tool server endpoint.
//!
//! Unix domain sockets on Unix, named pipes on Windows. Both are exposed as
//! a boxed bidirectional byte stream.

use std::io;
use std::path::Path;

use tokio::io::{AsyncRead, AsyncWrite};

pub trait IpcIo: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T> IpcIo for T where T: AsyncRead + AsyncWrite + Unpin + Send {}

pub type IpcStream = Box<dyn IpcIo>;

#[cfg(unix)]
use tokio::net::{UnixListener, UnixStream};

#[cfg(windows)]
use tokio::net::windows::named_pipe::{ClientOptions, ServerOptions};

pub struct IpcListener {
    #[cfg(unix)]
    inner: UnixListener,
    #[cfg(windows)]
    name: String,
}

/// Bind an endpoint, replacing a stale socket file if one is left over.
pub async fn bind(path: &Path) -> io::Result<IpcListener> {
    #[cfg(unix)]
    {
        if path.exists() {
            let _ = std::fs::remove_file(path);
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let inner = UnixListener::bind(path)?;
        Ok(IpcListener { inner })
    }

    #[cfg(windows)]
    {
        Ok(IpcListener {
            name: pipe_name_from_path(path),
        })
    }
}

/// Connect once. Retrying is up to the caller.
pub async fn connect(path: &Path) -> io::Result<IpcStream> {
    #[cfg(unix)]
    {
        let stream = UnixStream::connect(path).await?;
        Ok(Box::new(stream))
    }

    #[cfg(windows)]
    {
        let client = ClientOptions::new().open(pipe_name_from_path(path))?;
        Ok(Box::new(client))
    }
}

impl IpcListener {
    pub async fn accept(&self) -> io::Result<IpcStream> {
        #[cfg(unix)]
        {
            let (stream, _addr) = self.inner.accept().await?;
            Ok(Box::new(stream))
        }

        #[cfg(windows)]
        {
            let server = ServerOptions::new().create(&self.name)?;
            server.connect().await?;
            Ok(Box::new(server))
        }
    }
}

/// Remove the endpoint file, if the platform leaves one behind.
pub fn cleanup(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        if path.exists() {
            std::fs::remove_file(path)?;
        }
    }

    #[cfg(windows)]
    {
        let _ = path;
    }

    Ok(())
}

#[cfg(windows)]
fn pipe_name_from_path(path: &Path) -> String {
    let name = path.to_string_lossy().to_string();
    if name.starts_with(r"\\.\pipe\") {
        name
    } else {
        format!(r"\\.\pipe\{}", name.replace(['\\', '/', ':'], "-"))
    }
}
