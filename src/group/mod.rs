//! Prime-order group abstraction (C1). Concretely backed by P-256
//! (`p256`/`elliptic-curve`), but the rest of the crate only ever sees
//! [`Point`] and [`Scalar`] — no `p256` type leaks past this module.

mod hash_to_curve;

pub use hash_to_curve::HashToCurveMethod;

use elliptic_curve::group::GroupEncoding;
use elliptic_curve::sec1::{FromEncodedPoint, ToEncodedPoint};
use elliptic_curve::{Field, Group, PrimeField};
use p256::{AffinePoint, EncodedPoint, NonZeroScalar, ProjectivePoint, Scalar as P256Scalar};
use rand_core::OsRng;
use subtle::ConstantTimeEq;

use crate::error::GroupError;

/// An element of the group. Never the identity; construction enforces this.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Point(ProjectivePoint);

/// An integer modulo the group order `q`, `0 < s < q`.
#[derive(Clone, Copy, Debug)]
pub struct Scalar(P256Scalar);

impl Point {
    /// The group's standard base point.
    pub fn generator() -> Self {
        Point(ProjectivePoint::GENERATOR)
    }

    fn from_projective(p: ProjectivePoint) -> Result<Self, GroupError> {
        if bool::from(p.is_identity()) {
            return Err(GroupError::IdentityPoint);
        }
        Ok(Point(p))
    }

    /// Decodes a SEC1-encoded point, compressed (`0x02`/`0x03` prefix) or
    /// uncompressed (`0x04` prefix). Rejects off-curve points and the
    /// identity.
    pub fn decode(bytes: &[u8]) -> Result<Self, GroupError> {
        let encoded = EncodedPoint::from_bytes(bytes).map_err(|_| GroupError::BadEncoding)?;
        let affine = Option::<AffinePoint>::from(AffinePoint::from_encoded_point(&encoded))
            .ok_or(GroupError::NotOnCurve)?;
        Point::from_projective(ProjectivePoint::from(affine))
    }

    /// Encodes as `0x04 || X || Y` (65 bytes for P-256).
    pub fn encode_uncompressed(&self) -> Vec<u8> {
        self.0.to_affine().to_encoded_point(false).as_bytes().to_vec()
    }

    /// Encodes as `0x02|0x03 || X` (33 bytes for P-256).
    pub fn encode_compressed(&self) -> Vec<u8> {
        self.0.to_affine().to_encoded_point(true).as_bytes().to_vec()
    }

    /// Attempts to decode `prefix || digest` as a compressed point, trying
    /// `0x02` then `0x03`. Used only by the increment hash-to-curve method.
    fn try_decode_compressed_with_sign(digest: &[u8]) -> Option<Self> {
        for prefix in [0x02u8, 0x03u8] {
            let mut buf = Vec::with_capacity(1 + digest.len());
            buf.push(prefix);
            buf.extend_from_slice(digest);
            if let Ok(p) = Point::decode(&buf) {
                return Some(p);
            }
        }
        None
    }

    pub fn hash_to_curve(data: &[u8], method: HashToCurveMethod) -> Result<Self, GroupError> {
        hash_to_curve::hash_to_curve(data, method)
    }

    pub fn add(&self, other: &Point) -> Point {
        Point(self.0 + other.0)
    }

    pub fn scalar_mul(&self, s: &Scalar) -> Point {
        Point(self.0 * s.0)
    }

    /// Canonical tagged (compressed SEC1) byte encoding used inside
    /// DLEQ/MAC transcripts and on the wire.
    pub(crate) fn to_bytes_for_hash(&self) -> Vec<u8> {
        self.0.to_bytes().to_vec()
    }
}

impl ConstantTimeEq for Point {
    fn ct_eq(&self, other: &Self) -> subtle::Choice {
        self.0.to_bytes().ct_eq(&other.0.to_bytes())
    }
}

impl Scalar {
    /// Samples a scalar uniformly in `[1, q)` via rejection sampling,
    /// delegating to the field implementation's constant-time rejection
    /// loop (the same `⌈log2 q/8⌉`-byte masked-rejection technique the
    /// external interface specifies).
    pub fn random() -> Self {
        loop {
            let candidate = P256Scalar::random(&mut OsRng);
            if !bool::from(candidate.is_zero()) {
                return Scalar(candidate);
            }
        }
    }

    /// Derives a scalar deterministically from a XOF-style byte stream by
    /// interpreting it as a big-endian integer and reducing modulo `q`,
    /// redrawing on values that reduce to zero. Used by the batch DLEQ
    /// coefficient derivation (§4.2).
    pub fn from_xof_bytes(bytes: &[u8; 32]) -> Self {
        P256Scalar::from_repr((*bytes).into())
            .into_option()
            .filter(|s| !bool::from(s.is_zero()))
            .map(Scalar)
            .unwrap_or_else(Self::random)
    }

    pub fn invert(&self) -> Result<Self, GroupError> {
        Option::<P256Scalar>::from(self.0.invert())
            .map(Scalar)
            .ok_or(GroupError::InvalidScalar)
    }

    pub fn mul(&self, other: &Scalar) -> Scalar {
        Scalar(self.0 * other.0)
    }

    pub fn add(&self, other: &Scalar) -> Scalar {
        Scalar(self.0 + other.0)
    }

    pub fn sub(&self, other: &Scalar) -> Scalar {
        Scalar(self.0 - other.0)
    }

    pub(crate) fn inner(&self) -> P256Scalar {
        self.0
    }

    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_repr().into()
    }
}

impl From<NonZeroScalar> for Scalar {
    fn from(s: NonZeroScalar) -> Self {
        Scalar(*s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_compressed_and_uncompressed() {
        let p = Point::generator().scalar_mul(&Scalar::random());
        let c = Point::decode(&p.encode_compressed()).unwrap();
        let u = Point::decode(&p.encode_uncompressed()).unwrap();
        assert_eq!(p, c);
        assert_eq!(p, u);
    }

    #[test]
    fn inversion_round_trips_scalar_mul() {
        let t = Point::generator().scalar_mul(&Scalar::random());
        let r = Scalar::random();
        let blinded = t.scalar_mul(&r);
        let unblinded = blinded.scalar_mul(&r.invert().unwrap());
        assert_eq!(t, unblinded);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Point::decode(&[0u8; 33]).is_err());
    }
}
