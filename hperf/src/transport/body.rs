use std::io::{self, Write};

use flate2::write::GzDecoder;
use http::{header, HeaderMap, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;

use crate::error::TransportError;

/// Reads the response body until the end, decompressing it on the fly if
/// requested.
///
/// Only "gzip" content encoding is decoded, other encodings are read as is.
/// Decoded data is discarded.
pub async fn drain(response: Response<Incoming>, decompress: bool) -> Result<StatusCode, TransportError> {
    let status = response.status();
    let mut decoder = (decompress && is_gzip(response.headers())).then(|| GzDecoder::new(io::sink()));

    let mut body = response.into_body();
    while let Some(frame) = body.frame().await {
        let frame = frame?;

        if let (Some(decoder), Some(data)) = (decoder.as_mut(), frame.data_ref()) {
            decoder.write_all(data).map_err(TransportError::Decode)?;
        }
    }

    if let Some(decoder) = decoder {
        decoder.finish().map_err(TransportError::Decode)?;
    }

    Ok(status)
}

#[inline]
fn is_gzip(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_ENCODING)
        .is_some_and(|v| v.as_bytes().eq_ignore_ascii_case(b"gzip"))
}
