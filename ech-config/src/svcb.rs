//! Pulling an `ECHConfigs` blob out of a raw SVCB/HTTPS resource record,
//! as opposed to the presentation-format text handled in [`crate::encoding`].
//!
//! Wire format (RFC 9460 §2.2): `priority(2) ‖ target_name(wire) ‖
//! { SvcParamKey(2) ‖ SvcParamValue<2> }*`. `SvcParamKey = 5` holds the
//! `ECHConfigs`.

use byteorder::{BigEndian, ReadBytesExt};
use std::io::{self, Cursor, Read};

/// The `SvcParamKey` that carries an `ECHConfigList` (RFC 9460 §11, draft-ietf-tls-esni).
const SVCPARAMKEY_ECH: u16 = 5;

/// Reads a DNS wire-format name (a sequence of length-prefixed labels
/// terminated by a zero-length label) off the front of `cursor`, without
/// following compression pointers — SVCB RDATA targets are required not to
/// use them (RFC 9460 §2.2).
pub fn read_dns_name(cursor: &mut Cursor<&[u8]>) -> io::Result<String> {
    let mut labels = Vec::new();

    loop {
        let len = cursor.read_u8()?;
        if len == 0 {
            break;
        }
        if len & 0xC0 != 0 {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "compression pointers are not allowed in SVCB RDATA target names",
            ));
        }
        let mut buf = vec![0u8; usize::from(len)];
        cursor.read_exact(&mut buf)?;
        labels.push(String::from_utf8_lossy(&buf).into_owned());
    }

    Ok(labels.join("."))
}

/// Extracts the raw `ECHConfigs` bytes (including their length prefix) from
/// a complete SVCB/HTTPS RDATA buffer, if the `ech` SvcParam is present.
pub fn extract_ech_param(rdata: &[u8]) -> io::Result<Option<Vec<u8>>> {
    let mut cursor = Cursor::new(rdata);

    // priority
    cursor.read_u16::<BigEndian>()?;
    // target name
    read_dns_name(&mut cursor)?;

    loop {
        let key = match cursor.read_u16::<BigEndian>() {
            Ok(key) => key,
            Err(_) => return Ok(None),
        };
        let len = cursor.read_u16::<BigEndian>()?;
        let mut value = vec![0u8; usize::from(len)];
        cursor.read_exact(&mut value)?;

        if key == SVCPARAMKEY_ECH {
            return Ok(Some(value));
        }
    }
}
