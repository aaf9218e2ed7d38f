//! Local HTTP fixture server and archive builders shared by integration tests.

#![allow(dead_code)]

use md5::{Digest, Md5};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tiny_http::{Header, Response, Server};

type Served = HashMap<String, (Vec<u8>, Vec<(String, String)>)>;

/// Serves fixed byte payloads by path and records every request.
pub struct TestServer {
    server: Arc<Server>,
    base_url: String,
    files: Arc<Mutex<Served>>,
    requests: Arc<Mutex<Vec<String>>>,
    count: Arc<AtomicUsize>,
    handle: Option<JoinHandle<()>>,
}

impl TestServer {
    pub fn start() -> Self {
        let server = Arc::new(Server::http("127.0.0.1:0").unwrap());
        let addr = server.server_addr().to_ip().unwrap();
        let base_url = format!("http://{}", addr);

        let files: Arc<Mutex<Served>> = Arc::new(Mutex::new(HashMap::new()));
        let requests = Arc::new(Mutex::new(Vec::new()));
        let count = Arc::new(AtomicUsize::new(0));

        let handle = {
            let server = Arc::clone(&server);
            let files = Arc::clone(&files);
            let requests = Arc::clone(&requests);
            let count = Arc::clone(&count);
            std::thread::spawn(move || {
                for request in server.incoming_requests() {
                    let path = request.url().split('?').next().unwrap_or("").to_string();
                    count.fetch_add(1, Ordering::SeqCst);
                    requests.lock().unwrap().push(path.clone());

                    let body = files.lock().unwrap().get(&path).cloned();
                    let _ = match body {
                        Some((bytes, headers)) => {
                            let mut response = Response::from_data(bytes);
                            for (name, value) in headers {
                                response = response
                                    .with_header(Header::from_bytes(name.as_bytes(), value.as_bytes()).unwrap());
                            }
                            request.respond(response)
                        }
                        None => request.respond(Response::from_string("not found").with_status_code(404)),
                    };
                }
            })
        };

        Self {
            server,
            base_url,
            files,
            requests,
            count,
            handle: Some(handle),
        }
    }

    /// Serve `bytes` at `path` and return the full URL.
    pub fn serve(&self, path: &str, bytes: Vec<u8>) -> String {
        self.serve_with_headers(path, bytes, &[])
    }

    /// Serve `bytes` at `path` with extra response headers.
    pub fn serve_with_headers(&self, path: &str, bytes: Vec<u8>, headers: &[(&str, &str)]) -> String {
        let headers = headers
            .iter()
            .map(|(name, value)| (name.to_string(), value.to_string()))
            .collect();
        self.files.lock().unwrap().insert(path.to_string(), (bytes, headers));
        self.url(path)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Number of requests received so far
    pub fn hits(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Requested paths in arrival order
    pub fn requested(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.server.unblock();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

pub fn md5_hex(bytes: &[u8]) -> String {
    format!("{:x}", Md5::digest(bytes))
}

pub fn zip_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut cursor);
        for (name, content) in entries {
            zip.start_file(*name, zip::write::SimpleFileOptions::default())
                .unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap();
    }
    cursor.into_inner()
}

pub fn tar_gz_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (name, content) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(content.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, name, *content).unwrap();
    }
    let tar = builder.into_inner().unwrap();

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(&tar).unwrap();
    encoder.finish().unwrap()
}
