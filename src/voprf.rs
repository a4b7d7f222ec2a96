//! VOPRF primitives (C3, §4.3): blinding, signing, key derivation, and the
//! request-binding MAC. All constant-time comparisons go through
//! `subtle::ConstantTimeEq`; nothing here uses `==` on secret-derived bytes.

use hmac::{Hmac, Mac};
use rand_core::{OsRng, RngCore};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::group::{HashToCurveMethod, Point, Scalar};

type HmacSha256 = Hmac<Sha256>;

const DERIVE_KEY_LABEL: &[u8] = b"hash_derive_key";
const REQUEST_BINDING_LABEL: &[u8] = b"hash_request_binding";

/// A freshly sampled client-side token: the random preimage, its image on
/// the curve, and the blinding factor applied to it.
pub struct BlindToken {
    pub preimage: [u8; 32],
    pub blinded_point: Point,
    pub blind: Scalar,
}

/// `r ← Z/qZ`, `P = r·T`.
pub fn blind(t: &Point) -> (Point, Scalar) {
    let r = Scalar::random();
    (t.scalar_mul(&r), r)
}

/// `N = r⁻¹ · Q`.
pub fn unblind(q: &Point, r: &Scalar) -> Result<Point, crate::error::GroupError> {
    Ok(q.scalar_mul(&r.invert()?))
}

/// `Q = x · P`.
pub fn sign_point(p: &Point, x: &Scalar) -> Point {
    p.scalar_mul(x)
}

/// `DeriveKey(N, t) = HMAC(key = "hash_derive_key", data = t || enc(N))`.
pub fn derive_key(n: &Point, t: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(DERIVE_KEY_LABEL).expect("hmac accepts any key length");
    mac.update(t);
    mac.update(&n.encode_uncompressed());
    mac.finalize().into_bytes().into()
}

/// `HMAC(K, "hash_request_binding" || concat(data))`.
pub fn create_request_binding(k: &[u8; 32], data: &[&[u8]]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(k).expect("hmac accepts any key length");
    mac.update(REQUEST_BINDING_LABEL);
    for chunk in data {
        mac.update(chunk);
    }
    mac.finalize().into_bytes().into()
}

/// Constant-time comparison of a supplied MAC against the locally computed
/// binding over `observed`.
pub fn check_request_binding(k: &[u8; 32], supplied: &[u8; 32], observed: &[&[u8]]) -> bool {
    let expected = create_request_binding(k, observed);
    expected.ct_eq(supplied).into()
}

/// Samples `t`, computes `T = HashToCurve(t)`, and blinds it.
pub fn create_blind_token(method: HashToCurveMethod) -> Result<BlindToken, crate::error::GroupError> {
    let mut preimage = [0u8; 32];
    OsRng.fill_bytes(&mut preimage);
    let t = Point::hash_to_curve(&preimage, method)?;
    let (blinded_point, blind) = blind(&t);
    Ok(BlindToken {
        preimage,
        blinded_point,
        blind,
    })
}
