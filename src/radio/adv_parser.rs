//! Advertising-data parsing for the discovery filter.

use heapless::String;

use super::ServiceUuid;

/// AD type: incomplete list of 128-bit service UUIDs.
const AD_UUID128_INCOMPLETE: u8 = 0x06;
/// AD type: complete list of 128-bit service UUIDs.
const AD_UUID128_COMPLETE: u8 = 0x07;
const AD_NAME_SHORT: u8 = 0x08;
const AD_NAME_COMPLETE: u8 = 0x09;

/// Iterate `(ad_type, payload)` pairs, stopping at the first malformed entry.
fn ad_structures(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut i = 0;
    core::iter::from_fn(move || {
        let len = *data.get(i)? as usize;
        if len == 0 || i + len >= data.len() {
            return None;
        }
        let ad_type = data[i + 1];
        let payload = &data[i + 2..i + 1 + len];
        i += len + 1;
        Some((ad_type, payload))
    })
}

/// Check if raw advertisement data lists `uuid` as a 128-bit service UUID.
pub fn contains_service_uuid128(data: &[u8], uuid: &ServiceUuid) -> bool {
    ad_structures(data)
        .filter(|(ad_type, _)| {
            *ad_type == AD_UUID128_INCOMPLETE || *ad_type == AD_UUID128_COMPLETE
        })
        .any(|(_, payload)| {
            payload
                .chunks_exact(16)
                .any(|chunk| chunk == uuid.as_le_bytes())
        })
}

/// Extract complete/shortened local name from advertisement data.
pub fn extract_device_name(data: &[u8]) -> String<32> {
    let found = ad_structures(data)
        .find(|(ad_type, _)| *ad_type == AD_NAME_SHORT || *ad_type == AD_NAME_COMPLETE);

    let mut name = String::new();
    match found {
        Some((_, name_bytes)) => {
            for &b in name_bytes {
                if name.push(b as char).is_err() {
                    break;
                }
            }
        }
        None => {
            let _ = name.push_str("Unknown");
        }
    }
    name
}

/// Build connectable advertising data: flags + complete local name.
///
/// Returns the number of bytes written, or 0 if `buf` is too small.
pub fn build_adv_data(name: &str, buf: &mut [u8]) -> usize {
    let name = name.as_bytes();
    let total = 3 + 2 + name.len();
    if buf.len() < total || name.len() > 29 {
        return 0;
    }
    // LE General Discoverable, BR/EDR not supported.
    buf[..3].copy_from_slice(&[0x02, 0x01, 0x06]);
    buf[3] = (name.len() + 1) as u8;
    buf[4] = AD_NAME_COMPLETE;
    buf[5..total].copy_from_slice(name);
    total
}

/// Build scan response data carrying the 128-bit service UUID.
pub fn build_scan_data(uuid: &ServiceUuid, buf: &mut [u8]) -> usize {
    if buf.len() < 18 {
        return 0;
    }
    buf[0] = 17;
    buf[1] = AD_UUID128_COMPLETE;
    buf[2..18].copy_from_slice(uuid.as_le_bytes());
    18
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LINK_SERVICE_UUID;

    fn uuid_ad(ad_type: u8, uuids: &[&[u8; 16]]) -> heapless::Vec<u8, 64> {
        let mut out = heapless::Vec::new();
        out.push((1 + 16 * uuids.len()) as u8).unwrap();
        out.push(ad_type).unwrap();
        for u in uuids {
            out.extend_from_slice(&u[..]).unwrap();
        }
        out
    }

    #[test]
    fn detect_service_uuid_in_complete_list() {
        let ad = uuid_ad(0x07, &[LINK_SERVICE_UUID.as_le_bytes()]);
        assert!(contains_service_uuid128(&ad, &LINK_SERVICE_UUID));
    }

    #[test]
    fn detect_service_uuid_in_incomplete_list() {
        let ad = uuid_ad(0x06, &[LINK_SERVICE_UUID.as_le_bytes()]);
        assert!(contains_service_uuid128(&ad, &LINK_SERVICE_UUID));
    }

    #[test]
    fn service_uuid_among_multiple_uuids() {
        let other = [0xAA; 16];
        let ad = uuid_ad(0x07, &[&other, LINK_SERVICE_UUID.as_le_bytes()]);
        assert!(contains_service_uuid128(&ad, &LINK_SERVICE_UUID));
    }

    #[test]
    fn other_service_uuid_is_rejected() {
        let other = [0xAA; 16];
        let ad = uuid_ad(0x07, &[&other]);
        assert!(!contains_service_uuid128(&ad, &LINK_SERVICE_UUID));
    }

    #[test]
    fn uuid_bytes_under_wrong_ad_type_are_ignored() {
        // Same bytes tagged as manufacturer data.
        let ad = uuid_ad(0xFF, &[LINK_SERVICE_UUID.as_le_bytes()]);
        assert!(!contains_service_uuid128(&ad, &LINK_SERVICE_UUID));
    }

    #[test]
    fn uuid_after_flags_and_name() {
        let mut ad: heapless::Vec<u8, 64> = heapless::Vec::new();
        ad.extend_from_slice(&[0x02, 0x01, 0x06, 0x03, 0x09, b'a', b'b'])
            .unwrap();
        ad.extend_from_slice(&uuid_ad(0x07, &[LINK_SERVICE_UUID.as_le_bytes()]))
            .unwrap();
        assert!(contains_service_uuid128(&ad, &LINK_SERVICE_UUID));
        assert_eq!(extract_device_name(&ad).as_str(), "ab");
    }

    #[test]
    fn empty_and_malformed_data() {
        assert!(!contains_service_uuid128(&[], &LINK_SERVICE_UUID));
        assert!(!contains_service_uuid128(&[0x00], &LINK_SERVICE_UUID));
        // Length claims more bytes than present.
        assert!(!contains_service_uuid128(&[0x11, 0x07, 0x23], &LINK_SERVICE_UUID));
    }

    #[test]
    fn extract_shortened_local_name() {
        let ad_data = [0x05, 0x08, b'B', b'T', b' ', b'K'];
        assert_eq!(extract_device_name(&ad_data).as_str(), "BT K");
    }

    #[test]
    fn no_name_in_advertisement() {
        let ad_data = [0x02, 0x01, 0x06];
        assert_eq!(extract_device_name(&ad_data).as_str(), "Unknown");
    }

    #[test]
    fn name_truncated_to_32_chars() {
        let mut ad_data = [0u8; 40];
        ad_data[0] = 35;
        ad_data[1] = 0x09;
        for b in ad_data.iter_mut().take(37).skip(2) {
            *b = b'X';
        }
        assert_eq!(extract_device_name(&ad_data).len(), 32);
    }

    #[test]
    fn built_advertisement_parses_back() {
        let mut adv = [0u8; 31];
        let adv_len = build_adv_data("linkguard", &mut adv);
        assert_eq!(adv_len, 3 + 2 + 9);
        assert_eq!(extract_device_name(&adv[..adv_len]).as_str(), "linkguard");

        let mut scan = [0u8; 31];
        let scan_len = build_scan_data(&LINK_SERVICE_UUID, &mut scan);
        assert_eq!(scan_len, 18);
        assert!(contains_service_uuid128(&scan[..scan_len], &LINK_SERVICE_UUID));
    }

    #[test]
    fn build_rejects_small_buffers() {
        let mut tiny = [0u8; 4];
        assert_eq!(build_adv_data("linkguard", &mut tiny), 0);
        assert_eq!(build_scan_data(&LINK_SERVICE_UUID, &mut tiny), 0);
    }
}
