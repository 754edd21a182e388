//! Affine arithmetic on the Brainpool curves used by PACE
//!
//! Points are kept in affine coordinates over `Uint<576, 9>`, wide enough for the
//! 512-bit curve plus the carry of a modular addition. Scalar multiplication is
//! plain double-and-add and therefore not constant time.

use hex_literal::hex;
use rand::{CryptoRng, RngCore};

/// Unsigned integer wide enough for every supported field
pub type Uint = ruint::Uint<576, 9>;

/// Brainpool curves selectable through a standardized domain parameter id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrainpoolCurve {
    /// brainpoolP256r1, parameter id 13
    P256r1,
    /// brainpoolP384r1, parameter id 16
    P384r1,
    /// brainpoolP512r1, parameter id 17
    P512r1,
}

impl BrainpoolCurve {
    /// Curve for a standardized domain parameter id (BSI TR-03110 part 3, A.2.1.1)
    pub const fn from_parameter_id(id: u64) -> Option<Self> {
        match id {
            13 => Some(Self::P256r1),
            16 => Some(Self::P384r1),
            17 => Some(Self::P512r1),
            _ => None,
        }
    }

    /// Standardized domain parameter id
    pub const fn parameter_id(self) -> u64 {
        match self {
            Self::P256r1 => 13,
            Self::P384r1 => 16,
            Self::P512r1 => 17,
        }
    }

    /// Domain parameters of this curve
    pub fn curve(self) -> Curve {
        match self {
            Self::P256r1 => Curve::from_raw(
                &hex!("A9FB57DBA1EEA9BC3E660A909D838D726E3BF623D52620282013481D1F6E5377"),
                &hex!("7D5A0975FC2C3057EEF67530417AFFE7FB8055C126DC5C6CE94A4B44F330B5D9"),
                &hex!("26DC5C6CE94A4B44F330B5D9BBD77CBF958416295CF7E1CE6BCCDC18FF8C07B6"),
                &hex!("8BD2AEB9CB7E57CB2C4B482FFC81B7AFB9DE27E1E3BD23C23A4453BD9ACE3262"),
                &hex!("547EF835C3DAC4FD97F8461A14611DC9C27745132DED8E545C1D54C72F046997"),
                &hex!("A9FB57DBA1EEA9BC3E660A909D838D718C397AA3B561A6F7901E0E82974856A7"),
            ),
            Self::P384r1 => Curve::from_raw(
                &hex!(
                    "8CB91E82A3386D280F5D6F7E50E641DF152F7109ED5456B412B1DA197FB71123"
                    "ACD3A729901D1A71874700133107EC53"
                ),
                &hex!(
                    "7BC382C63D8C150C3C72080ACE05AFA0C2BEA28E4FB22787139165EFBA91F90F"
                    "8AA5814A503AD4EB04A8C7DD22CE2826"
                ),
                &hex!(
                    "04A8C7DD22CE28268B39B55416F0447C2FB77DE107DCD2A62E880EA53EEB62D5"
                    "7CB4390295DBC9943AB78696FA504C11"
                ),
                &hex!(
                    "1D1C64F068CF45FFA2A63A81B7C13F6B8847A3E77EF14FE3DB7FCAFE0CBD10E8"
                    "E826E03436D646AAEF87B2E247D4AF1E"
                ),
                &hex!(
                    "8ABE1D7520F9C2A45CB1EB8E95CFD55262B70B29FEEC5864E19C054FF9912928"
                    "0E4646217791811142820341263C5315"
                ),
                &hex!(
                    "8CB91E82A3386D280F5D6F7E50E641DF152F7109ED5456B31F166E6CAC0425A7"
                    "CF3AB6AF6B7FC3103B883202E9046565"
                ),
            ),
            Self::P512r1 => Curve::from_raw(
                &hex!(
                    "AADD9DB8DBE9C48B3FD4E6AE33C9FC07CB308DB3B3C9D20ED6639CCA70330871"
                    "7D4D9B009BC66842AECDA12AE6A380E62881FF2F2D82C68528AA6056583A48F3"
                ),
                &hex!(
                    "7830A3318B603B89E2327145AC234CC594CBDD8D3DF91610A83441CAEA9863BC"
                    "2DED5D5AA8253AA10A2EF1C98B9AC8B57F1117A72BF2C7B9E7C1AC4D77FC94CA"
                ),
                &hex!(
                    "3DF91610A83441CAEA9863BC2DED5D5AA8253AA10A2EF1C98B9AC8B57F1117A7"
                    "2BF2C7B9E7C1AC4D77FC94CADC083E67984050B75EBAE5DD2809BD638016F723"
                ),
                &hex!(
                    "81AEE4BDD82ED9645A21322E9C4C6A9385ED9F70B5D916C1B43B62EEF4D0098E"
                    "FF3B1F78E2D0D48D50D1687B93B97D5F7C6D5047406A5E688B352209BCB9F822"
                ),
                &hex!(
                    "7DDE385D566332ECC0EABFA9CF7822FDF209F70024A57B1AA000C55B881F8111"
                    "B2DCDE494A5F485E5BCA4BD88A2763AED1CA2B2FA8F0540678CD1E0F3AD80892"
                ),
                &hex!(
                    "AADD9DB8DBE9C48B3FD4E6AE33C9FC07CB308DB3B3C9D20ED6639CCA70330870"
                    "553E5C414CA92619418661197FAC10471DB1D381085DDADDB58796829CA90069"
                ),
            ),
        }
    }
}

/// Point on a short Weierstrass curve
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Point {
    /// Neutral element
    Infinity,
    /// Finite point
    Affine {
        /// x-coordinate
        x: Uint,
        /// y-coordinate
        y: Uint,
    },
}

impl Point {
    /// Whether this is the neutral element
    pub const fn is_infinity(&self) -> bool {
        matches!(self, Self::Infinity)
    }
}

/// Error decoding a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PointError {
    /// Not `04 || X || Y` of the right length
    #[error("unsupported point encoding")]
    Encoding,
    /// Coordinates outside the field or not on the curve
    #[error("point not on curve")]
    NotOnCurve,
}

/// Domain parameters `y^2 = x^3 + ax + b` over `GF(p)` with base point `G` of order `n`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Curve {
    p: Uint,
    a: Uint,
    b: Uint,
    g: Point,
    n: Uint,
    field_len: usize,
}

impl Curve {
    fn from_raw(p: &[u8], a: &[u8], b: &[u8], gx: &[u8], gy: &[u8], n: &[u8]) -> Self {
        Self {
            p: Uint::from_be_slice(p),
            a: Uint::from_be_slice(a),
            b: Uint::from_be_slice(b),
            g: Point::Affine {
                x: Uint::from_be_slice(gx),
                y: Uint::from_be_slice(gy),
            },
            n: Uint::from_be_slice(n),
            field_len: p.len(),
        }
    }

    /// Base point
    pub const fn generator(&self) -> Point {
        self.g
    }

    /// Order of the base point
    pub const fn order(&self) -> Uint {
        self.n
    }

    /// Length in bytes of a field element
    pub const fn field_len(&self) -> usize {
        self.field_len
    }

    fn add_mod(&self, a: Uint, b: Uint) -> Uint {
        a.add_mod(b, self.p)
    }

    fn sub_mod(&self, a: Uint, b: Uint) -> Uint {
        a.add_mod(self.p.wrapping_sub(b), self.p)
    }

    fn mul_mod(&self, a: Uint, b: Uint) -> Uint {
        a.mul_mod(b, self.p)
    }

    /// Whether `point` satisfies the curve equation
    pub fn contains(&self, point: &Point) -> bool {
        match *point {
            Point::Infinity => true,
            Point::Affine { x, y } => {
                if x >= self.p || y >= self.p {
                    return false;
                }
                let lhs = self.mul_mod(y, y);
                let x3 = self.mul_mod(self.mul_mod(x, x), x);
                let rhs = self.add_mod(self.add_mod(x3, self.mul_mod(self.a, x)), self.b);
                lhs == rhs
            }
        }
    }

    /// Negation of a point
    pub fn negate(&self, point: &Point) -> Point {
        match *point {
            Point::Infinity => Point::Infinity,
            Point::Affine { x, y } => Point::Affine {
                x,
                y: self.sub_mod(Uint::ZERO, y),
            },
        }
    }

    /// Sum of two points
    pub fn add(&self, lhs: &Point, rhs: &Point) -> Point {
        let (x1, y1, x2, y2) = match (*lhs, *rhs) {
            (Point::Infinity, q) => return q,
            (p, Point::Infinity) => return p,
            (Point::Affine { x: x1, y: y1 }, Point::Affine { x: x2, y: y2 }) => (x1, y1, x2, y2),
        };

        let lambda = if x1 == x2 {
            if y1 != y2 || y1.is_zero() {
                return Point::Infinity;
            }
            // Tangent slope (3x^2 + a) / 2y
            let three = Uint::from(3u64);
            let numerator = self.add_mod(self.mul_mod(three, self.mul_mod(x1, x1)), self.a);
            let Some(inverse) = self.add_mod(y1, y1).inv_mod(self.p) else {
                return Point::Infinity;
            };
            self.mul_mod(numerator, inverse)
        } else {
            let Some(inverse) = self.sub_mod(x2, x1).inv_mod(self.p) else {
                return Point::Infinity;
            };
            self.mul_mod(self.sub_mod(y2, y1), inverse)
        };

        let x3 = self.sub_mod(self.sub_mod(self.mul_mod(lambda, lambda), x1), x2);
        let y3 = self.sub_mod(self.mul_mod(lambda, self.sub_mod(x1, x3)), y1);
        Point::Affine { x: x3, y: y3 }
    }

    /// Scalar multiple `k * point`
    pub fn mul(&self, k: &Uint, point: &Point) -> Point {
        let mut result = Point::Infinity;
        for i in (0..k.bit_len()).rev() {
            result = self.add(&result, &result);
            if k.bit(i) {
                result = self.add(&result, point);
            }
        }
        result
    }

    /// Scalar multiple of the base point
    pub fn mul_generator(&self, k: &Uint) -> Point {
        self.mul(k, &self.g)
    }

    /// Uniform scalar in `[1, n)` by rejection sampling
    pub fn random_scalar<R: RngCore + CryptoRng>(&self, rng: &mut R) -> Uint {
        let bits = self.n.bit_len();
        let len = bits.div_ceil(8);
        let excess = len * 8 - bits;
        let mut buf = vec![0u8; len];
        loop {
            rng.fill_bytes(&mut buf);
            buf[0] &= 0xFF >> excess;
            let k = Uint::from_be_slice(&buf);
            if !k.is_zero() && k < self.n {
                return k;
            }
        }
    }

    /// Big-endian field element padded to the field length
    pub fn encode_field_element(&self, value: &Uint) -> Vec<u8> {
        let bytes = value.to_be_bytes_vec();
        bytes[bytes.len() - self.field_len..].to_vec()
    }

    /// Uncompressed encoding `04 || X || Y`
    ///
    /// The point at infinity encodes as the single byte `00`.
    pub fn encode_point(&self, point: &Point) -> Vec<u8> {
        match point {
            Point::Infinity => vec![0x00],
            Point::Affine { x, y } => {
                let mut out = Vec::with_capacity(1 + 2 * self.field_len);
                out.push(0x04);
                out.extend(self.encode_field_element(x));
                out.extend(self.encode_field_element(y));
                out
            }
        }
    }

    /// Decode an uncompressed point and check it lies on the curve
    pub fn decode_point(&self, data: &[u8]) -> Result<Point, PointError> {
        let Some((&0x04, coordinates)) = data.split_first() else {
            return Err(PointError::Encoding);
        };
        if coordinates.len() != 2 * self.field_len {
            return Err(PointError::Encoding);
        }
        let (x, y) = coordinates.split_at(self.field_len);
        let point = Point::Affine {
            x: Uint::from_be_slice(x),
            y: Uint::from_be_slice(y),
        };
        if self.contains(&point) {
            Ok(point)
        } else {
            Err(PointError::NotOnCurve)
        }
    }
}
