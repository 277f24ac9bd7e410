//! ECH Encryptor, client side (§4.E).

use crate::builder::{self, ChPrefix, ExtensionList};
use crate::extensions;
use crate::hpke_suite;
use crate::EchError;
use byteorder::{BigEndian, WriteBytesExt};
use ech_config::{ECHConfig, ECHConfigBody, ECHConfigList};
use std::collections::BTreeSet;

/// The ECH extension's wire body, ready to be appended to the outer CH:
/// `kdf_id ‖ aead_id ‖ config_id ‖ enc<2> ‖ ciphertext<2>`.
fn encode_ech_extension(kdf_id: u16, aead_id: u16, config_id: u8, enc: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, EchError> {
    let mut out = Vec::new();
    out.write_u16::<BigEndian>(kdf_id).map_err(EchError::from)?;
    out.write_u16::<BigEndian>(aead_id).map_err(EchError::from)?;
    out.push(config_id);
    out.write_u16::<BigEndian>(u16::try_from(enc.len()).map_err(|_| EchError::InternalInvariant("enc too long"))?)
        .map_err(EchError::from)?;
    out.extend_from_slice(enc);
    out.write_u16::<BigEndian>(
        u16::try_from(ciphertext.len()).map_err(|_| EchError::InternalInvariant("ciphertext too long"))?,
    )
    .map_err(EchError::from)?;
    out.extend_from_slice(ciphertext);
    Ok(out)
}

/// Picks the config to encrypt against. If `outer_name` is set, prefers a
/// config whose `public_name` matches it; otherwise (or if none match)
/// falls back to the first config with a supported suite.
fn select_config<'a>(
    configs: &'a ECHConfigList,
    outer_name: Option<&str>,
) -> Result<(&'a ECHConfig, u16, u16), EchError> {
    let supported = |c: &'a ECHConfig| -> Option<(&'a ECHConfig, u16, u16)> {
        match &c.contents {
            ECHConfigBody::Known(contents) => contents
                .cipher_suites
                .iter()
                .find(|s| hpke_suite::is_supported(contents.kem_id, s.kdf_id, s.aead_id))
                .map(|s| (c, s.kdf_id, s.aead_id)),
            ECHConfigBody::Unknown(_) => None,
        }
    };

    if let Some(name) = outer_name {
        if !name.is_empty() {
            if let Some(found) = configs.configs().iter().find_map(|c| match &c.contents {
                ECHConfigBody::Known(contents) if contents.public_name.to_string() == name => supported(c),
                _ => None,
            }) {
                return Ok(found);
            }
        }
    }

    configs.configs().iter().find_map(supported).ok_or(EchError::NoCompatibleConfig)
}

/// Everything the encryptor needs about the outer CH it's splicing into,
/// besides the inner CH's own prefix/extensions.
pub struct OuterRequest<'a> {
    /// The outer CH's prefix (its own `random`/`session_id`/suites).
    pub prefix: &'a ChPrefix,
    /// Independently generated extension values for the outer CH
    /// (`server_name`, `alpn`, `key_share`, ...).
    pub independent_values: &'a [(u16, Vec<u8>)],
    /// Any already-finalized outer extensions that come after where ECH
    /// will be inserted (usually empty — ECH is typically appended last).
    pub trailing_extensions: &'a [(u16, Vec<u8>)],
}

/// The result of a successful encryption: the full outer ClientHello
/// ready for the wire, and the `EncodedClientHelloInner` that was sealed
/// (kept around for transcript bookkeeping by the caller).
#[derive(Debug)]
pub struct Encrypted {
    pub outer_client_hello: Vec<u8>,
    pub encoded_client_hello_inner: Vec<u8>,
}

/// Encrypts `inner_extensions` (the first-pass inner CH's extensions)
/// against the first matching config in `configs`, building and splicing
/// the ECH extension into the outer CH described by `request`.
pub fn encrypt(
    configs: &ECHConfigList,
    outer_name: Option<&str>,
    inner_extensions: &ExtensionList,
    compress: &BTreeSet<u16>,
    request: OuterRequest<'_>,
) -> Result<Encrypted, EchError> {
    let (config, kdf_id, aead_id) = select_config(configs, outer_name)?;
    let contents = match &config.contents {
        ECHConfigBody::Known(c) => c,
        ECHConfigBody::Unknown(_) => return Err(EchError::NoCompatibleConfig),
    };

    let encoded_client_hello_inner = builder::encode_client_hello_inner(request.prefix, inner_extensions, compress)?;

    let outer_extensions = builder::build_outer_extensions(inner_extensions, request.independent_values);
    let mut outer_extensions_with_trailing = outer_extensions;
    outer_extensions_with_trailing.extend_from_slice(request.trailing_extensions);

    let outer_ch_body = build_outer_ch_prefix(request.prefix, &outer_extensions_with_trailing)?;
    let info = build_info(configs.exact_encoding(config));
    let config_id = contents.config_id;

    // The AAD embeds `enc`, which only exists once encapsulation has run,
    // so `seal` hands it back to this closure before encrypting.
    let mut aad_err = None;
    let (enc, ciphertext) = hpke_suite::seal(
        contents.kem_id,
        kdf_id,
        aead_id,
        &contents.public_key,
        &info,
        &encoded_client_hello_inner,
        |enc| match build_aad(kdf_id, aead_id, config_id, enc, &outer_ch_body) {
            Ok(aad) => aad,
            Err(e) => {
                aad_err = Some(e);
                Vec::new()
            }
        },
    )?;
    if let Some(e) = aad_err {
        return Err(e);
    }

    let ech_body = encode_ech_extension(kdf_id, aead_id, config_id, &enc, &ciphertext)?;

    let mut final_extensions = outer_extensions_with_trailing;
    final_extensions.push((extensions::ECH, ech_body));

    let outer_client_hello = crate::client_hello::rebuild(
        &request.prefix.encode(&request.prefix.session_id)?,
        &encode_extension_list(&final_extensions)?,
    )
    .map_err(EchError::from)?;

    Ok(Encrypted { outer_client_hello, encoded_client_hello_inner })
}

/// Builds the outer CH up to but not including the ECH extension — this
/// is the exact shape `AAD` is computed over.
fn build_outer_ch_prefix(prefix: &ChPrefix, outer_extensions_without_ech: &[(u16, Vec<u8>)]) -> Result<Vec<u8>, EchError> {
    crate::client_hello::rebuild(
        &prefix.encode(&prefix.session_id)?,
        &encode_extension_list(outer_extensions_without_ech)?,
    )
    .map_err(EchError::from)
}

fn encode_extension_list(extensions: &[(u16, Vec<u8>)]) -> Result<Vec<u8>, EchError> {
    let mut out = Vec::new();
    for (ext_type, body) in extensions {
        out.write_u16::<BigEndian>(*ext_type).map_err(EchError::from)?;
        out.write_u16::<BigEndian>(u16::try_from(body.len()).map_err(|_| EchError::InternalInvariant("extension body too long"))?)
            .map_err(EchError::from)?;
        out.extend_from_slice(body);
    }
    Ok(out)
}

/// `kdf_id(2) ‖ aead_id(2) ‖ config_id(1) ‖ enc_len(2) ‖ enc ‖
/// outer_ch_body_len(3) ‖ outer_ch_body`.
fn build_aad(kdf_id: u16, aead_id: u16, config_id: u8, enc: &[u8], outer_ch_body: &[u8]) -> Result<Vec<u8>, EchError> {
    let mut out = Vec::new();
    out.write_u16::<BigEndian>(kdf_id).map_err(EchError::from)?;
    out.write_u16::<BigEndian>(aead_id).map_err(EchError::from)?;
    out.push(config_id);
    out.write_u16::<BigEndian>(u16::try_from(enc.len()).map_err(|_| EchError::InternalInvariant("enc too long"))?)
        .map_err(EchError::from)?;
    out.extend_from_slice(enc);
    let len = u32::try_from(outer_ch_body.len()).map_err(|_| EchError::InternalInvariant("outer CH too long"))?;
    out.push(((len >> 16) & 0xff) as u8);
    out.push(((len >> 8) & 0xff) as u8);
    out.push((len & 0xff) as u8);
    out.extend_from_slice(outer_ch_body);
    Ok(out)
}

/// `"tls ech" ‖ 0x00 ‖ <config's exact encoded bytes>`.
fn build_info(config_bytes: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + config_bytes.len());
    out.extend_from_slice(b"tls ech");
    out.push(0);
    out.extend_from_slice(config_bytes);
    out
}

#[cfg(test)]
mod test {
    use super::*;
    use ech_config::{CipherSuite, ECHConfigContents, PublicName};

    fn sample_config() -> ECHConfig {
        let contents = ECHConfigContents {
            config_id: 9,
            kem_id: hpke_suite::KEM_DHKEM_X25519_HKDF_SHA256,
            public_key: hpke_suite::generate_keypair(hpke_suite::KEM_DHKEM_X25519_HKDF_SHA256).unwrap().1,
            cipher_suites: vec![CipherSuite {
                kdf_id: hpke_suite::KDF_HKDF_SHA256,
                aead_id: hpke_suite::AEAD_CHACHA20_POLY1305,
            }],
            maximum_name_length: 32,
            public_name: "public.example".parse::<PublicName>().unwrap(),
            extensions: Vec::new(),
        };
        ECHConfig { version: 0x000a, contents: ECHConfigBody::Known(contents), encoding_start: 0, encoding_length: 0 }
    }

    #[test]
    fn encrypts_and_splices_ech_extension() {
        let configs = ECHConfigList::from(vec![sample_config()]);
        let prefix = ChPrefix {
            legacy_version: 0x0303,
            random: [7; 32],
            session_id: vec![1, 2, 3],
            cipher_suites: vec![0x13, 0x01],
            compression_methods: vec![0],
        };
        let inner_extensions: ExtensionList = vec![(extensions::SERVER_NAME, b"secret.example".to_vec())];
        let mut compress = BTreeSet::new();
        compress.insert(extensions::SUPPORTED_VERSIONS);

        let request = OuterRequest {
            prefix: &prefix,
            independent_values: &[(extensions::SERVER_NAME, b"public.example".to_vec())],
            trailing_extensions: &[],
        };

        let result = encrypt(&configs, Some("public.example"), &inner_extensions, &compress, request).unwrap();
        let view = crate::client_hello::ClientHelloView::parse(&result.outer_client_hello).unwrap();
        assert!(view.find(extensions::ECH).is_some());
    }

    #[test]
    fn fails_without_a_compatible_config() {
        let configs = ECHConfigList::from(Vec::new());
        let prefix = ChPrefix {
            legacy_version: 0x0303,
            random: [0; 32],
            session_id: vec![],
            cipher_suites: vec![0x13, 0x01],
            compression_methods: vec![0],
        };
        let request = OuterRequest { prefix: &prefix, independent_values: &[], trailing_extensions: &[] };
        let err = encrypt(&configs, None, &Vec::new(), &BTreeSet::new(), request).unwrap_err();
        assert!(matches!(err, EchError::NoCompatibleConfig));
    }
}
