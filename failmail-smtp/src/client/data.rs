//! Message transfer encoding for the DATA phase.

/// Prepare `message` for transmission after a `354` reply.
///
/// Bare `\n` line endings become `\r\n`, lines starting with `.` get an
/// extra `.` (RFC 5321 section 4.5.2), and the result ends with the
/// `\r\n.\r\n` terminator.
#[must_use]
pub fn dot_stuff(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 64 + 5);
    let mut line_start = true;
    let mut previous = None;

    for &byte in message {
        if line_start && byte == b'.' {
            out.push(b'.');
        }
        if byte == b'\n' && previous != Some(b'\r') {
            out.push(b'\r');
        }
        out.push(byte);

        line_start = byte == b'\n';
        previous = Some(byte);
    }

    if !out.is_empty() && !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}
