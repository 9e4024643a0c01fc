//! HTTP request handlers
//!
//! Errors map to status codes: validation → 400, unknown channel → 404,
//! invalid state → 409, anything else → 500, each with a `{status}` body.

use crate::api::server::AppContext;
use crate::error::Error;
use crate::playback::{PlayOutcome, PrebufferPurpose, PrebufferStatus};
use crate::state::{ChannelRecord, ChannelView};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use onair_common::{ChannelId, Track};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub module: String,
    pub version: String,
    pub channels: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
}

/// Track given inline, or an id resolved through the metadata API
#[derive(Debug, Deserialize)]
pub struct TrackRequest {
    #[serde(default)]
    pub track: Option<Track>,
    #[serde(default, alias = "trackId")]
    pub track_id: Option<String>,
    /// Start playback once loaded (load only)
    #[serde(default)]
    pub play: bool,
}

#[derive(Debug, Deserialize)]
pub struct SeekRequest {
    pub position: f64,
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    /// 0.0-1.0
    pub volume: f64,
}

#[derive(Debug, Serialize)]
pub struct PrebufferInfo {
    pub active: Option<PrebufferStatus>,
    pub next: Option<PrebufferStatus>,
}

#[derive(Debug, Serialize)]
pub struct ChannelResponse {
    #[serde(flatten)]
    pub record: ChannelRecord,
    pub prebuffer: PrebufferInfo,
}

#[derive(Debug, Serialize)]
pub struct PlayResponse {
    pub outcome: PlayOutcome,
    pub channel: ChannelResponse,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GestureResponse {
    pub fired: usize,
}

type ApiError = (StatusCode, Json<StatusResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

fn api_error(err: Error) -> ApiError {
    let status = match &err {
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::UnknownChannel(_) => StatusCode::NOT_FOUND,
        Error::InvalidState(_) => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        warn!(kind = err.kind(), "Request failed: {}", err);
    }
    (
        status,
        Json(StatusResponse {
            status: format!("error: {}", err),
        }),
    )
}

fn channel_response(ctx: &AppContext, view: &ChannelView) -> ChannelResponse {
    let channel = &view.channel;
    let status = |purpose| ctx.engine.prebuffer_status(channel, purpose).ok().flatten();
    ChannelResponse {
        record: ChannelRecord::clone(view),
        prebuffer: PrebufferInfo {
            active: status(PrebufferPurpose::Active),
            next: status(PrebufferPurpose::Next),
        },
    }
}

fn channel_json(ctx: &AppContext, view: &ChannelView) -> Json<ChannelResponse> {
    Json(channel_response(ctx, view))
}

/// Inline track, or fetch `track_id` from the metadata API
async fn resolve_track(ctx: &AppContext, request: TrackRequest) -> Result<Track, Error> {
    if let Some(track) = request.track {
        return Ok(track);
    }
    let Some(track_id) = request.track_id else {
        return Err(Error::Validation("request needs `track` or `track_id`".to_string()));
    };
    let Some(client) = &ctx.metadata else {
        return Err(Error::Validation(format!(
            "no metadata API configured to resolve track {}; send the track inline",
            track_id
        )));
    };
    client.fetch_track(&track_id).await
}

// ============================================================================
// Health & Status
// ============================================================================

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "onair-playout".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        channels: ctx.engine.channels().len(),
    })
}

/// GET /channels
pub async fn list_channels(State(ctx): State<AppContext>) -> Json<Vec<ChannelResponse>> {
    Json(
        ctx.engine
            .snapshot()
            .iter()
            .map(|view| channel_response(&ctx, view))
            .collect(),
    )
}

/// GET /channels/:channel
pub async fn get_channel(
    State(ctx): State<AppContext>,
    Path(channel): Path<String>,
) -> ApiResult<ChannelResponse> {
    let view = ctx.engine.get(&ChannelId::from(channel)).map_err(api_error)?;
    Ok(channel_json(&ctx, &view))
}

// ============================================================================
// Lifecycle Commands
// ============================================================================

/// POST /channels/:channel/load
pub async fn load(
    State(ctx): State<AppContext>,
    Path(channel): Path<String>,
    Json(request): Json<TrackRequest>,
) -> ApiResult<ChannelResponse> {
    let channel = ChannelId::from(channel);
    let play = request.play;
    let track = resolve_track(&ctx, request).await.map_err(api_error)?;
    info!(channel = %channel, track_id = %track.id, play, "Load requested");

    if play {
        ctx.engine
            .play_track(&channel, track)
            .await
            .map_err(api_error)?;
    } else {
        ctx.engine
            .load_track(&channel, track)
            .await
            .map_err(api_error)?;
    }
    let view = ctx.engine.get(&channel).map_err(api_error)?;
    Ok(channel_json(&ctx, &view))
}

/// POST /channels/:channel/play
pub async fn play(
    State(ctx): State<AppContext>,
    Path(channel): Path<String>,
) -> ApiResult<PlayResponse> {
    let channel = ChannelId::from(channel);
    let outcome = ctx.engine.play(&channel).await.map_err(api_error)?;
    let view = ctx.engine.get(&channel).map_err(api_error)?;
    Ok(Json(PlayResponse {
        outcome,
        channel: channel_response(&ctx, &view),
    }))
}

/// POST /channels/:channel/pause
pub async fn pause(
    State(ctx): State<AppContext>,
    Path(channel): Path<String>,
) -> ApiResult<ChannelResponse> {
    let view = ctx
        .engine
        .pause(&ChannelId::from(channel))
        .await
        .map_err(api_error)?;
    Ok(channel_json(&ctx, &view))
}

/// POST /channels/:channel/stop
pub async fn stop(
    State(ctx): State<AppContext>,
    Path(channel): Path<String>,
) -> ApiResult<ChannelResponse> {
    let view = ctx
        .engine
        .stop(&ChannelId::from(channel))
        .await
        .map_err(api_error)?;
    Ok(channel_json(&ctx, &view))
}

/// POST /channels/:channel/seek
pub async fn seek(
    State(ctx): State<AppContext>,
    Path(channel): Path<String>,
    Json(request): Json<SeekRequest>,
) -> ApiResult<ChannelResponse> {
    let view = ctx
        .engine
        .seek(&ChannelId::from(channel), request.position)
        .await
        .map_err(api_error)?;
    Ok(channel_json(&ctx, &view))
}

/// POST /channels/:channel/volume
pub async fn set_volume(
    State(ctx): State<AppContext>,
    Path(channel): Path<String>,
    Json(request): Json<VolumeRequest>,
) -> ApiResult<ChannelResponse> {
    let view = ctx
        .engine
        .set_volume(&ChannelId::from(channel), request.volume)
        .map_err(api_error)?;
    Ok(channel_json(&ctx, &view))
}

/// POST /channels/:channel/next - queue and prebuffer the next track
pub async fn prebuffer_next(
    State(ctx): State<AppContext>,
    Path(channel): Path<String>,
    Json(request): Json<TrackRequest>,
) -> ApiResult<ChannelResponse> {
    let channel = ChannelId::from(channel);
    // Unknown channels fail before any metadata lookup
    ctx.engine.get(&channel).map_err(api_error)?;
    let track = resolve_track(&ctx, request).await.map_err(api_error)?;
    let view = ctx
        .engine
        .prebuffer_next(&channel, track)
        .map_err(api_error)?;
    Ok(channel_json(&ctx, &view))
}

/// POST /channels/:channel/unload
pub async fn unload(
    State(ctx): State<AppContext>,
    Path(channel): Path<String>,
) -> ApiResult<ChannelResponse> {
    let view = ctx
        .engine
        .unload_track(&ChannelId::from(channel))
        .await
        .map_err(api_error)?;
    Ok(channel_json(&ctx, &view))
}

// ============================================================================
// Host Gesture
// ============================================================================

/// POST /gesture - relay a user gesture to waiting channels
pub async fn gesture(State(ctx): State<AppContext>) -> Json<GestureResponse> {
    let fired = ctx.gestures.signal_gesture();
    Json(GestureResponse { fired })
}
