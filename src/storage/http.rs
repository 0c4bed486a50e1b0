//! HTTP/HTTPS access for remote indexes and primary files.
//!
//! # Features
//!
//! - Validator lookup via HEAD (`ETag`, then `Last-Modified`)
//! - Whole-file downloads for index caching
//! - Seekable range-request reader for remote primary files

use super::{Fetcher, Fingerprint, ReadSeek};
use crate::{Error, Result};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::time::Duration;
use tracing::debug;
use ureq::Agent;
use url::Url;

/// Bytes fetched per range request.
const BLOCK_SIZE: u64 = 1 << 16;

/// Blocking HTTP/HTTPS fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
    agent: Agent,
    block_size: u64,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        let agent: Agent = Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self {
            agent,
            block_size: BLOCK_SIZE,
        }
    }

    /// Bytes requested per range read by readers this fetcher opens.
    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    /// Get the content length of a URL via HEAD request.
    fn content_length(&self, url: &str) -> Result<u64> {
        let response = self
            .agent
            .head(url)
            .call()
            .map_err(|e| Error::Network(format!("HEAD {}: {}", url, e)))?;

        response
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok())
            .ok_or_else(|| Error::Network(format!("missing Content-Length for {}", url)))
    }
}

impl Fetcher for HttpFetcher {
    fn fingerprint(&self, url: &Url) -> Result<Option<Fingerprint>> {
        let response = self
            .agent
            .head(url.as_str())
            .call()
            .map_err(|e| Error::Network(format!("HEAD {}: {}", url, e)))?;

        let headers = response.headers();
        let header = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        // Content-Length is not a validator; without one the index is always refetched
        let fingerprint = if let Some(etag) = header("etag") {
            Some(Fingerprint::new(
                etag.trim_start_matches("W/").trim_matches('"'),
            ))
        } else {
            header("last-modified").map(|modified| Fingerprint::new(format!("modified:{}", modified)))
        };

        debug!(%url, fingerprint = ?fingerprint, "fetched remote fingerprint");
        Ok(fingerprint)
    }

    fn download(&self, url: &Url, dest: &mut dyn Write) -> Result<u64> {
        let response = self
            .agent
            .get(url.as_str())
            .call()
            .map_err(|e| Error::Network(format!("GET {}: {}", url, e)))?;

        let mut reader = response.into_body().into_reader();
        io::copy(&mut reader, dest)
            .map_err(|e| Error::Network(format!("failed to read {}: {}", url, e)))
    }

    fn open(&self, url: &Url) -> Result<Box<dyn ReadSeek>> {
        let length = self.content_length(url.as_str())?;
        Ok(Box::new(
            RemoteReader::new(self.agent.clone(), url.to_string(), length)
                .with_block_size(self.block_size),
        ))
    }
}

/// `Read + Seek` over HTTP range requests, buffered one block at a time.
pub struct RemoteReader {
    agent: Agent,
    url: String,
    length: u64,
    position: u64,
    buffer: Vec<u8>,
    buffer_start: u64,
    block_size: u64,
}

impl RemoteReader {
    pub fn new(agent: Agent, url: String, length: u64) -> Self {
        Self {
            agent,
            url,
            length,
            position: 0,
            buffer: Vec::new(),
            buffer_start: 0,
            block_size: BLOCK_SIZE,
        }
    }

    pub fn with_block_size(mut self, block_size: u64) -> Self {
        self.block_size = block_size.max(1);
        self
    }

    pub fn len(&self) -> u64 {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    fn fill(&mut self) -> io::Result<()> {
        let end = (self.position + self.block_size).min(self.length) - 1;
        let bytes = fetch_range(&self.agent, &self.url, self.position, end)
            .map_err(io::Error::other)?;
        if bytes.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("empty range response from {}", self.url),
            ));
        }
        self.buffer = bytes;
        self.buffer_start = self.position;
        Ok(())
    }
}

impl Read for RemoteReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() || self.position >= self.length {
            return Ok(0);
        }

        let buffer_end = self.buffer_start + self.buffer.len() as u64;
        if self.position < self.buffer_start || self.position >= buffer_end {
            self.fill()?;
        }

        let offset = (self.position - self.buffer_start) as usize;
        let available = &self.buffer[offset..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for RemoteReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(n) => Some(n),
            SeekFrom::End(delta) => self.length.checked_add_signed(delta),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
        };

        match target {
            Some(n) => {
                self.position = n;
                Ok(n)
            }
            None => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of remote file",
            )),
        }
    }
}

/// Fetch an inclusive byte range, tolerating servers that ignore `Range`.
fn fetch_range(agent: &Agent, url: &str, start: u64, end: u64) -> Result<Vec<u8>> {
    let response = agent
        .get(url)
        .header("Range", format!("bytes={}-{}", start, end))
        .call()
        .map_err(|e| Error::Network(format!("GET {} bytes {}-{}: {}", url, start, end, e)))?;

    let partial = response.status().as_u16() == 206;
    let mut reader = response.into_body().into_reader();

    if !partial && start > 0 {
        io::copy(&mut reader.by_ref().take(start), &mut io::sink())?;
    }

    let mut bytes = Vec::with_capacity((end - start + 1) as usize);
    reader.take(end - start + 1).read_to_end(&mut bytes)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seek_bounds() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1));
        let mut reader = RemoteReader::new(
            fetcher.agent.clone(),
            "http://127.0.0.1:9/none".to_string(),
            100,
        );
        assert_eq!(reader.seek(SeekFrom::End(-10)).unwrap(), 90);
        assert_eq!(reader.seek(SeekFrom::Current(5)).unwrap(), 95);
        assert!(reader.seek(SeekFrom::Current(-200)).is_err());
        assert_eq!(reader.seek(SeekFrom::Start(100)).unwrap(), 100);

        // At EOF no request is made
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_unreachable_fingerprint_is_network_error() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1));
        let url: Url = "http://127.0.0.1:9/sample.bam.bai".parse().unwrap();
        assert!(matches!(fetcher.fingerprint(&url), Err(Error::Network(_))));
    }
}
