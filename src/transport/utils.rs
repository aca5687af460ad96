use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;

use crate::client::consts::AUTHORIZATION_HEADER;

pub fn build_request(url: &str, token: Option<&str>) -> tokio_tungstenite::tungstenite::Result<Request> {
    let mut request = url.into_client_request()?;
    if let Some(token) = token {
        request.headers_mut().insert(
            AUTHORIZATION_HEADER,
            format!("Bearer {}", token).as_str().parse()?,
        );
    }
    Ok(request)
}

pub fn pcm16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|sample| sample.to_le_bytes()).collect()
}

/// A trailing odd byte is dropped.
pub fn pcm16_from_le_bytes(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_only_with_token() {
        let request = build_request("ws://localhost:7860/ws", Some("abc")).unwrap();
        assert_eq!(request.headers().get(AUTHORIZATION_HEADER).unwrap(), "Bearer abc");

        let request = build_request("ws://localhost:7860/ws", None).unwrap();
        assert!(request.headers().get(AUTHORIZATION_HEADER).is_none());
    }

    #[test]
    fn pcm_is_little_endian() {
        assert_eq!(pcm16_to_le_bytes(&[1, -2]), vec![0x01, 0x00, 0xfe, 0xff]);
        assert_eq!(pcm16_from_le_bytes(&[0x01, 0x00, 0xfe, 0xff, 0x07]), vec![1, -2]);
    }
}
