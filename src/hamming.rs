const FACTORS: [usize; 3] = [2, 3, 5];

fn is_hamming(mut value: usize) -> bool {
    if value == 0 {
        return false;
    }
    for factor in FACTORS {
        while value % factor == 0 {
            value /= factor;
        }
    }
    value == 1
}

/// Smallest number greater than `value` with no prime factor above 5.
pub fn next_hamming(value: usize) -> usize {
    (value + 1..)
        .find(|&candidate| is_hamming(candidate))
        .unwrap_or(value)
}
