//! Minimal multipart/form-data body assembly.
//!
//! The HTTP client carries no multipart support, so the body is assembled by
//! hand: one part per field, CRLF framing, a random boundary unlikely to
//! collide with payload bytes.

use rand::Rng;

pub struct MultipartBody {
    boundary: String,
    buf: Vec<u8>,
}

impl MultipartBody {
    pub fn new() -> Self {
        let token: u64 = rand::thread_rng().gen();
        Self {
            boundary: format!("roadwatch{:016x}", token),
            buf: Vec::with_capacity(64 * 1024),
        }
    }

    /// Append a plain text field.
    pub fn add_text(&mut self, name: &str, value: &str) {
        self.buf.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                self.boundary, name, value
            )
            .as_bytes(),
        );
    }

    /// Append a file field with raw bytes.
    pub fn add_file(&mut self, name: &str, file_name: &str, content_type: &str, bytes: &[u8]) {
        self.buf.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                self.boundary, name, file_name, content_type
            )
            .as_bytes(),
        );
        self.buf.extend_from_slice(bytes);
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Header value for the request carrying this body.
    pub fn content_type(&self) -> String {
        format!("multipart/form-data; boundary={}", self.boundary)
    }

    /// Close the body with the terminal boundary.
    pub fn finish(mut self) -> Vec<u8> {
        self.buf
            .extend_from_slice(format!("--{}--\r\n", self.boundary).as_bytes());
        self.buf
    }
}

impl Default for MultipartBody {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_frames_file_part_with_boundary() {
        let mut body = MultipartBody::new();
        let boundary = body.content_type();
        let boundary = boundary
            .strip_prefix("multipart/form-data; boundary=")
            .expect("content type shape");
        let boundary = boundary.to_string();

        body.add_file("file", "road.jpg", "image/jpeg", b"\xFF\xD8jpegbytes\xFF\xD9");
        let bytes = body.finish();
        let text = String::from_utf8_lossy(&bytes);

        assert!(text.starts_with(&format!("--{}\r\n", boundary)));
        assert!(text.contains("Content-Disposition: form-data; name=\"file\"; filename=\"road.jpg\""));
        assert!(text.contains("Content-Type: image/jpeg"));
        assert!(text.ends_with(&format!("--{}--\r\n", boundary)));
    }

    #[test]
    fn text_field_is_framed() {
        let mut body = MultipartBody::new();
        body.add_text("confidence", "0.5");
        let bytes = body.finish();
        let text = String::from_utf8_lossy(&bytes);
        assert!(text.contains("name=\"confidence\"\r\n\r\n0.5\r\n"));
    }

    #[test]
    fn boundaries_are_unique_per_body() {
        let a = MultipartBody::new();
        let b = MultipartBody::new();
        assert_ne!(a.content_type(), b.content_type());
    }
}
