// =============================================================================
// Operator HTTP surface
// =============================================================================
//
// REST endpoints for status, risk and result ingestion plus a WebSocket that
// pushes every newly published recommendation.  Everything except
// `/api/v1/health` sits behind the admin bearer token.
// =============================================================================

pub mod auth;
pub mod rest;
pub mod ws;
