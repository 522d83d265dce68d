//! Token minting and validation.
//!
//! Tokens bind a caller to a specific `(app, point, method, params)`
//! tuple. The method is encoded as part of the signed message (the
//! stricter of the two source revisions' designs, per spec §9
//! ambiguity #3), which prevents a token minted for one method from
//! being replayed against another.
//!
//! Canonical encoding: the signed message is the `serde_json`
//! serialization of [`GeoTokenMsg`] (field order fixed by struct
//! declaration order). This is an implementation choice, not a
//! cross-implementation wire guarantee — the source system stringified
//! a Python tuple, which is not portable either.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha3::Sha3_256;
use subtle::ConstantTimeEq;

use crate::clock::Clock;
use crate::error::{GeoError, Result};
use crate::storage::AppStorage;

type HmacSha3 = Hmac<Sha3_256>;

pub const GEO_TOKEN_TTL_SECS: f64 = 3600.0;

/// Per-method parameters bound into a geo token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum GeoParams {
    UpdatePoint,
    NearestPoints { subject_id: String },
    PointsCoords { point_ids: Vec<String> },
}

impl GeoParams {
    pub fn method_id(&self) -> u8 {
        match self {
            GeoParams::UpdatePoint => 1,
            GeoParams::NearestPoints { .. } => 2,
            GeoParams::PointsCoords { .. } => 3,
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            GeoParams::UpdatePoint => "UPDATE_POINT",
            GeoParams::NearestPoints { .. } => "NEAREST_POINTS",
            GeoParams::PointsCoords { .. } => "POINTS_COORDS",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoTokenMsg {
    pub app_id: String,
    pub point_id: String,
    pub params: GeoParams,
    pub exp_time: f64,
}

/// An HMAC-signed capability binding a caller to one geo-operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoAuthToken {
    pub msg: GeoTokenMsg,
    pub mac: Vec<u8>,
}

impl GeoAuthToken {
    pub fn encode(&self) -> String {
        let json = serde_json::to_vec(self).expect("token serialization cannot fail");
        URL_SAFE_NO_PAD.encode(json)
    }

    pub fn decode(s: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(s)
            .map_err(|e| GeoError::AuthFailed(format!("malformed token: {e}")))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| GeoError::AuthFailed(format!("malformed token: {e}")))
    }
}

/// An opaque capability gating management endpoints for one tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppAuthToken {
    pub app_id: String,
    pub auth_key: String,
}

fn compute_mac(hmac_key: &[u8], msg: &GeoTokenMsg) -> Vec<u8> {
    let canonical = serde_json::to_vec(msg).expect("token serialization cannot fail");
    let mut mac = HmacSha3::new_from_slice(hmac_key).expect("hmac accepts any key length");
    mac.update(&canonical);
    mac.finalize().into_bytes().to_vec()
}

/// Mint a geo token for `(app_id, point_id, params)`, valid for
/// [`GEO_TOKEN_TTL_SECS`] from `clock.now()`.
pub fn mint_geo_token(
    storage: &dyn AppStorage,
    app_id: &str,
    point_id: &str,
    params: GeoParams,
    clock: &dyn Clock,
) -> Result<GeoAuthToken> {
    let hmac_key = storage.get_hmac_key(app_id)?;
    let exp_time = clock.now() + GEO_TOKEN_TTL_SECS;
    let msg = GeoTokenMsg {
        app_id: app_id.to_string(),
        point_id: point_id.to_string(),
        params,
        exp_time,
    };
    let mac = compute_mac(&hmac_key, &msg);
    Ok(GeoAuthToken { msg, mac })
}

/// Validate a geo token against the expected method, returning the
/// bound `(app_id, point_id, params)` on success.
///
/// Rejects on HMAC mismatch (`AuthFailed`), expiry (`TokenExpired`), a
/// method_id mismatch against `expected_method_id` (`AuthFailed` — a
/// token for one method must never be silently cross-routed to
/// another), or an unknown point (`NotFound`).
pub fn validate_geo_token(
    storage: &dyn AppStorage,
    token: &GeoAuthToken,
    expected_method_id: u8,
    clock: &dyn Clock,
) -> Result<(String, String, GeoParams)> {
    let hmac_key = storage.get_hmac_key(&token.msg.app_id)?;
    let expected_mac = compute_mac(&hmac_key, &token.msg);

    if expected_mac.ct_eq(&token.mac).unwrap_u8() != 1 {
        return Err(GeoError::AuthFailed("hmac mismatch".to_string()));
    }

    if token.msg.params.method_id() != expected_method_id {
        return Err(GeoError::AuthFailed("method mismatch".to_string()));
    }

    if token.msg.exp_time <= clock.now() {
        return Err(GeoError::TokenExpired);
    }

    if !storage.has_point(&token.msg.app_id, &token.msg.point_id) {
        return Err(GeoError::NotFound(format!("point {}", token.msg.point_id)));
    }

    Ok((
        token.msg.app_id.clone(),
        token.msg.point_id.clone(),
        token.msg.params.clone(),
    ))
}

pub fn mint_app_token(storage: &dyn AppStorage, app_id: &str) -> Result<AppAuthToken> {
    let auth_key = storage.get_auth_key(app_id)?;
    Ok(AppAuthToken {
        app_id: app_id.to_string(),
        auth_key,
    })
}

pub fn validate_app_token(storage: &dyn AppStorage, token: &AppAuthToken) -> Result<String> {
    let expected = storage.get_auth_key(&token.app_id)?;
    if expected.as_bytes().ct_eq(token.auth_key.as_bytes()).unwrap_u8() != 1 {
        return Err(GeoError::AuthFailed("invalid app auth token".to_string()));
    }
    Ok(token.app_id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::TestClock;
    use crate::storage::InMemoryAppStorage;

    fn setup() -> (InMemoryAppStorage, TestClock) {
        let storage = InMemoryAppStorage::new();
        storage.create_app("t1", 10).unwrap();
        storage.add_point("t1", "p0").unwrap();
        (storage, TestClock::new(0.0))
    }

    #[test]
    fn mint_then_validate_roundtrips() {
        let (storage, clock) = setup();
        let token =
            mint_geo_token(&storage, "t1", "p0", GeoParams::UpdatePoint, &clock).unwrap();
        let (app, point, params) = validate_geo_token(&storage, &token, 1, &clock).unwrap();
        assert_eq!(app, "t1");
        assert_eq!(point, "p0");
        assert_eq!(params, GeoParams::UpdatePoint);
    }

    #[test]
    fn wrong_method_id_is_rejected() {
        let (storage, clock) = setup();
        let token =
            mint_geo_token(&storage, "t1", "p0", GeoParams::UpdatePoint, &clock).unwrap();
        let result = validate_geo_token(&storage, &token, 2, &clock);
        assert!(matches!(result, Err(GeoError::AuthFailed(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let (storage, clock) = setup();
        let token =
            mint_geo_token(&storage, "t1", "p0", GeoParams::UpdatePoint, &clock).unwrap();
        clock.advance(GEO_TOKEN_TTL_SECS + 1.0);
        let result = validate_geo_token(&storage, &token, 1, &clock);
        assert!(matches!(result, Err(GeoError::TokenExpired)));
    }

    #[test]
    fn tampered_token_fails_hmac() {
        let (storage, clock) = setup();
        let mut token =
            mint_geo_token(&storage, "t1", "p0", GeoParams::UpdatePoint, &clock).unwrap();
        token.msg.point_id = "other".to_string();
        let result = validate_geo_token(&storage, &token, 1, &clock);
        assert!(matches!(result, Err(GeoError::AuthFailed(_))));
    }

    #[test]
    fn token_for_deleted_point_is_not_found() {
        let (storage, clock) = setup();
        let token =
            mint_geo_token(&storage, "t1", "p0", GeoParams::UpdatePoint, &clock).unwrap();
        storage.delete_point("t1", "p0").unwrap();
        let result = validate_geo_token(&storage, &token, 1, &clock);
        assert!(matches!(result, Err(GeoError::NotFound(_))));
    }

    #[test]
    fn nearest_points_token_binds_subject() {
        let (storage, clock) = setup();
        let token = mint_geo_token(
            &storage,
            "t1",
            "p0",
            GeoParams::NearestPoints {
                subject_id: "s1".to_string(),
            },
            &clock,
        )
        .unwrap();
        let (_, _, params) = validate_geo_token(&storage, &token, 2, &clock).unwrap();
        match params {
            GeoParams::NearestPoints { subject_id } => assert_eq!(subject_id, "s1"),
            _ => panic!("expected NearestPoints params"),
        }
    }

    #[test]
    fn encode_decode_roundtrips() {
        let (storage, clock) = setup();
        let token =
            mint_geo_token(&storage, "t1", "p0", GeoParams::UpdatePoint, &clock).unwrap();
        let encoded = token.encode();
        let decoded = GeoAuthToken::decode(&encoded).unwrap();
        assert_eq!(decoded.msg.app_id, token.msg.app_id);
        assert_eq!(decoded.mac, token.mac);
    }

    #[test]
    fn app_token_rejects_wrong_key() {
        let (storage, _clock) = setup();
        let bad = AppAuthToken {
            app_id: "t1".to_string(),
            auth_key: "wrong".to_string(),
        };
        assert!(validate_app_token(&storage, &bad).is_err());
    }

    #[test]
    fn app_token_accepts_minted_key() {
        let (storage, _clock) = setup();
        let token = mint_app_token(&storage, "t1").unwrap();
        assert_eq!(validate_app_token(&storage, &token).unwrap(), "t1");
    }
}
