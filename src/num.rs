/// Format number in Rust style: `1_000_000`, keep max length of u64, 20 digits.
pub(crate) fn format_pad_u64(n: u64) -> String {
    // separate each 3 digit with a '_'
    format!("{:020}", n).chars().enumerate().fold(
        String::new(),
        |mut acc, (i, c)| {
            if (i + 1) % 3 == 0 {
                acc.push('_');
            }
            acc.push(c);
            acc
        },
    )
}

/// Format a file offset with at least 9 digits: `000_001_024`.
pub(crate) fn format_pad9_u64(n: u64) -> String {
    let x = format!("{:09}", n);
    let len = x.len();
    x.chars().enumerate().fold(String::new(), |mut acc, (i, c)| {
        if i > 0 && (len - i) % 3 == 0 {
            acc.push('_');
        }
        acc.push(c);
        acc
    })
}

/// Round `n` up to a multiple of `unit`, in number of units.
pub(crate) fn div_ceil(n: u64, unit: u64) -> u64 {
    n / unit + if n % unit == 0 { 0 } else { 1 }
}

#[cfg(test)]
mod tests {
    use super::div_ceil;
    use super::format_pad9_u64;
    use super::format_pad_u64;

    #[test]
    fn test_format_aligned_num() {
        assert_eq!(format_pad_u64(u64::MAX), "18_446_744_073_709_551_615");
        assert_eq!(format_pad_u64(1_200_000), "00_000_000_000_001_200_000");
        assert_eq!(format_pad_u64(120_000), "00_000_000_000_000_120_000");
    }

    #[test]
    fn test_format_pad9_u64() {
        assert_eq!(format_pad9_u64(u64::MAX), "18_446_744_073_709_551_615");
        assert_eq!(format_pad9_u64(1_200_000), "001_200_000");
        assert_eq!(format_pad9_u64(28), "000_000_028");
    }

    #[test]
    fn test_div_ceil() {
        assert_eq!(div_ceil(0, 128), 0);
        assert_eq!(div_ceil(1, 128), 1);
        assert_eq!(div_ceil(128, 128), 1);
        assert_eq!(div_ceil(129, 128), 2);
    }
}
