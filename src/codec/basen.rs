//! Arbitrary-precision base conversion over a caller-supplied alphabet.
//!
//! Input bytes are treated as one big-endian number and re-expressed in the
//! base given by the alphabet length. Leading zero bytes survive the round trip
//! as leading zero symbols (the first symbol of the alphabet).

use super::Error;
use std::collections::HashMap;

/// Alphabet used by session and verifier tokens.
pub const BASE62: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

#[derive(Clone, Debug)]
pub struct Alphabet {
    symbols: Vec<char>,
    index: HashMap<char, u64>,
}

impl Alphabet {
    /// Build an alphabet, rejecting repeated symbols.
    ///
    /// # Errors
    /// Returns `Error::AmbiguousAlphabet` on a repeated symbol and
    /// `Error::AlphabetTooSmall` for fewer than two symbols.
    pub fn new(symbols: &str) -> Result<Self, Error> {
        let symbols: Vec<char> = symbols.chars().collect();
        if symbols.len() < 2 {
            return Err(Error::AlphabetTooSmall);
        }

        let mut index = HashMap::with_capacity(symbols.len());
        for (position, symbol) in (0_u64..).zip(symbols.iter().copied()) {
            if index.insert(symbol, position).is_some() {
                return Err(Error::AmbiguousAlphabet(symbol));
            }
        }

        Ok(Self { symbols, index })
    }

    /// The token alphabet (`0-9A-Za-z`).
    #[must_use]
    pub fn base62() -> Self {
        let symbols: Vec<char> = BASE62.chars().collect();
        let index = (0_u64..).zip(symbols.iter().copied()).map(|(i, c)| (c, i)).collect();
        Self { symbols, index }
    }

    #[must_use]
    pub fn base(&self) -> u64 {
        self.symbols.len() as u64
    }

    fn zero(&self) -> char {
        self.symbols[0]
    }

    /// Encode bytes, most significant symbol first.
    #[must_use]
    pub fn encode(&self, bytes: &[u8]) -> String {
        if bytes.is_empty() {
            return String::new();
        }

        let base = self.base();
        // little-endian digits in the target base
        let mut digits: Vec<u64> = vec![0];
        for &byte in bytes {
            let mut carry = u64::from(byte);
            for digit in &mut digits {
                carry += *digit << 8;
                *digit = carry % base;
                carry /= base;
            }
            while carry > 0 {
                digits.push(carry % base);
                carry /= base;
            }
        }

        let leading = bytes
            .iter()
            .take(bytes.len() - 1)
            .take_while(|&&byte| byte == 0)
            .count();

        let mut out = String::with_capacity(leading + digits.len());
        out.extend(std::iter::repeat_n(self.zero(), leading));
        for &digit in digits.iter().rev() {
            // digits are always reduced modulo the base
            out.push(self.symbols[usize::try_from(digit).unwrap_or_default()]);
        }
        out
    }

    /// Decode text back into big-endian bytes.
    ///
    /// # Errors
    /// Returns `Error::InvalidSymbol` for any symbol outside the alphabet.
    pub fn decode(&self, text: &str) -> Result<Vec<u8>, Error> {
        if text.is_empty() {
            return Ok(Vec::new());
        }

        let base = self.base();
        let symbols: Vec<char> = text.chars().collect();
        // little-endian base-256 accumulator
        let mut bytes: Vec<u8> = vec![0];
        for &symbol in &symbols {
            let mut carry = *self.index.get(&symbol).ok_or(Error::InvalidSymbol(symbol))?;
            for byte in &mut bytes {
                carry += u64::from(*byte) * base;
                *byte = (carry & 0xff) as u8;
                carry >>= 8;
            }
            while carry > 0 {
                bytes.push((carry & 0xff) as u8);
                carry >>= 8;
            }
        }

        let zero = self.zero();
        let leading = symbols
            .iter()
            .take(symbols.len() - 1)
            .take_while(|&&symbol| symbol == zero)
            .count();
        bytes.extend(std::iter::repeat_n(0, leading));
        bytes.reverse();

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_repeated_symbols() {
        assert_eq!(
            Alphabet::new("0123456789abcdefa").err(),
            Some(Error::AmbiguousAlphabet('a'))
        );
    }

    #[test]
    fn rejects_single_symbol() {
        assert_eq!(Alphabet::new("x").err(), Some(Error::AlphabetTooSmall));
        assert_eq!(Alphabet::new("").err(), Some(Error::AlphabetTooSmall));
    }

    #[test]
    fn empty_round_trip() -> Result<(), Error> {
        let alphabet = Alphabet::base62();
        assert_eq!(alphabet.encode(&[]), "");
        assert_eq!(alphabet.decode("")?, Vec::<u8>::new());
        Ok(())
    }

    #[test]
    fn hex_alphabet_matches_positional_notation() -> Result<(), Error> {
        let alphabet = Alphabet::new("0123456789abcdef")?;
        assert_eq!(alphabet.encode(&[0x01, 0xff]), "1ff");
        assert_eq!(alphabet.decode("1ff")?, vec![0x01, 0xff]);
        Ok(())
    }

    #[test]
    fn leading_zero_bytes_are_preserved() -> Result<(), Error> {
        let alphabet = Alphabet::new("01")?;
        assert_eq!(alphabet.encode(&[0, 5]), "0101");
        assert_eq!(alphabet.decode("0101")?, vec![0, 5]);

        let alphabet = Alphabet::base62();
        for input in [vec![0], vec![0, 0], vec![0, 0, 0, 7], vec![0, 0xff, 0]] {
            let encoded = alphabet.encode(&input);
            assert_eq!(alphabet.decode(&encoded)?, input, "encoded as {encoded}");
        }
        assert_eq!(alphabet.encode(&[0]), "0");
        assert_eq!(alphabet.encode(&[0, 0]), "00");
        Ok(())
    }

    #[test]
    fn bitcoin_alphabet_vector() -> Result<(), Error> {
        let alphabet = Alphabet::new("123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz")?;
        assert_eq!(alphabet.encode(b"Hello World!"), "2NEpo7TZRRrLZSi2U");
        assert_eq!(alphabet.decode("2NEpo7TZRRrLZSi2U")?, b"Hello World!");
        Ok(())
    }

    #[test]
    fn random_bytes_round_trip() -> Result<(), Error> {
        use rand::RngCore;

        let alphabet = Alphabet::base62();
        let mut rng = rand::thread_rng();
        for len in [1, 2, 29, 45, 64, 200] {
            let mut input = vec![0u8; len];
            rng.fill_bytes(&mut input);
            assert_eq!(alphabet.decode(&alphabet.encode(&input))?, input);
        }
        Ok(())
    }

    #[test]
    fn unknown_symbol_is_rejected() {
        let alphabet = Alphabet::base62();
        assert_eq!(alphabet.decode("abc-def").err(), Some(Error::InvalidSymbol('-')));
    }

    #[test]
    fn unicode_alphabet() -> Result<(), Error> {
        let alphabet = Alphabet::new("αβγδ")?;
        let encoded = alphabet.encode(&[0, 27]);
        assert_eq!(encoded, "αβγδ");
        assert_eq!(alphabet.decode(&encoded)?, vec![0, 27]);
        Ok(())
    }
}
