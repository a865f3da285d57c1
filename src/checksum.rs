// checksum.rs

/// Modbus RTU CRC-16 (polynomial 0xA001, reflected, initial 0xFFFF).
///
/// The result goes on the wire low byte first.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Modbus ASCII longitudinal redundancy check: two's complement of the byte sum.
pub fn lrc(data: &[u8]) -> u8 {
    let sum = data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b));
    sum.wrapping_neg()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc_of_empty_input_is_initial_value() {
        assert_eq!(crc16(&[]), 0xFFFF);
    }

    #[test]
    fn crc_matches_read_holding_request() {
        let crc = crc16(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]);
        assert_eq!(crc as u8, 0xC5);
        assert_eq!((crc >> 8) as u8, 0xCD);
    }

    #[test]
    fn crc_matches_exception_response() {
        assert_eq!(crc16(&[0x01, 0x83, 0x02]), 0xF1C0);
    }

    #[test]
    fn lrc_is_twos_complement_of_sum() {
        assert_eq!(lrc(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x0A]), 0xF2);
        assert_eq!(lrc(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]), 0xFB);
        assert_eq!(lrc(&[]), 0x00);
    }

    #[test]
    fn lrc_of_content_plus_lrc_sums_to_zero() {
        let content = [0x11, 0x06, 0x00, 0x01, 0x00, 0x03];
        let check = lrc(&content);
        let total = content
            .iter()
            .chain(std::iter::once(&check))
            .fold(0u8, |acc, &b| acc.wrapping_add(b));
        assert_eq!(total, 0);
    }
}
