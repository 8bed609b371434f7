//! Buffered `multipart/form-data` bodies for portal uploads.

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

// Characters that would break out of a quoted Content-Disposition parameter.
const FILENAME_ESCAPE: &AsciiSet = &CONTROLS.add(b'"').add(b'\\');

/// One file part of a form.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FormFile<'a> {
    pub field: &'a str,
    pub filename: &'a str,
    pub content_type: &'a str,
    pub data: &'a [u8],
}

pub(crate) struct EncodedForm {
    pub content_type: String,
    pub body: Vec<u8>,
}

fn boundary() -> String {
    format!("skyloom-boundary-{:016x}{:016x}", rand::random::<u64>(), rand::random::<u64>())
}

pub(crate) fn encode(files: &[FormFile<'_>]) -> EncodedForm {
    encode_with_boundary(files, &boundary())
}

fn encode_with_boundary(files: &[FormFile<'_>], boundary: &str) -> EncodedForm {
    let mut body = Vec::with_capacity(files.iter().map(|f| f.data.len() + 256).sum());
    for file in files {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
                utf8_percent_encode(file.field, FILENAME_ESCAPE),
                utf8_percent_encode(file.filename, FILENAME_ESCAPE),
            )
            .as_bytes(),
        );
        body.extend_from_slice(format!("Content-Type: {}\r\n\r\n", file.content_type).as_bytes());
        body.extend_from_slice(file.data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

    EncodedForm {
        content_type: format!("multipart/form-data; boundary={boundary}"),
        body,
    }
}
