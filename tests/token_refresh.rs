//! End-to-end token lifecycle flows, driven through the core with resolved
//! capability effects standing in for the shell.

use crux_core::testing::AppTester;
use crux_core::Request;
use parking_core::capabilities::{
    HttpError, HttpRequest, HttpResponse, KvOperation, StorageKey,
};
use parking_core::model::{AuthState, Session};
use parking_core::{ApiErrorCode, App, Effect, Event, Model};

fn authed_model() -> Model {
    let mut model = Model::default();
    model.session = Session::with_tokens(Some("access-old".into()), Some("refresh-1".into()));
    model.auth_state = AuthState::Ready;
    model
}

/// One update's effects, partitioned by capability. The enum variants carry
/// the request by value, so splitting consumes the batch.
#[derive(Default)]
struct ShellEffects {
    http: Vec<Request<HttpRequest>>,
    kv: Vec<Request<KvOperation>>,
}

fn split(effects: Vec<Effect>) -> ShellEffects {
    let mut shell = ShellEffects::default();
    for effect in effects {
        match effect {
            Effect::Http(request) => shell.http.push(request),
            Effect::KeyValue(request) => shell.kv.push(request),
            _ => {}
        }
    }
    shell
}

/// Feeds a batch of core-produced events back into the app, collecting all
/// resulting effects.
fn feed(app: &AppTester<App, Effect>, events: Vec<Event>, model: &mut Model) -> Vec<Effect> {
    let mut effects = Vec::new();
    for event in events {
        effects.extend(app.update(event, model).effects);
    }
    effects
}

fn token_pair_body(access: &str, refresh: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "data": {"accessToken": access, "refreshToken": refresh},
        "error": null,
    }))
    .unwrap()
}

fn lots_body() -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "data": [{
            "parkingLotId": 1,
            "name": "Main Gate",
            "latitude": 37.32,
            "longitude": 127.12,
            "totalSlots": 50,
            "availableSlots": 20,
        }],
        "error": null,
    }))
    .unwrap()
}

#[test]
fn refresh_then_retry_succeeds_once() {
    let app = AppTester::<App, _>::default();
    let mut model = authed_model();

    let update = app.update(Event::LotsRefreshRequested, &mut model);
    let mut requests = split(update.effects).http;
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0].operation.headers.get("authorization"),
        Some("Bearer access-old")
    );
    assert!(requests[0].operation.url.ends_with("/parking-lots"));

    // Access token is expired: the lot fetch comes back 401.
    let update = app
        .resolve(&mut requests[0], Ok(HttpResponse::new(401, vec![])))
        .expect("resolve 401");
    let effects = split(feed(&app, update.events, &mut model));

    // That triggers exactly one renewal call, authenticated by the refresh
    // token rather than the dead access token.
    let mut refresh_requests = effects.http;
    assert_eq!(refresh_requests.len(), 1);
    assert!(refresh_requests[0].operation.url.ends_with("/auth/token"));
    assert_eq!(
        refresh_requests[0].operation.headers.get("authorization"),
        Some("Bearer refresh-1")
    );
    assert!(model.refresh.is_in_flight());

    // Renewal succeeds with a fresh pair.
    let update = app
        .resolve(
            &mut refresh_requests[0],
            Ok(HttpResponse::new(200, token_pair_body("access-new", "refresh-2"))),
        )
        .expect("resolve refresh");
    let effects = split(feed(&app, update.events, &mut model));

    assert_eq!(model.session.access_token(), Some("access-new"));
    assert_eq!(model.session.refresh_token(), Some("refresh-2"));
    assert!(!model.refresh.is_in_flight());

    // Both tokens are persisted together.
    assert!(effects.kv.iter().any(|r| matches!(
        &r.operation,
        KvOperation::SetMulti { pairs }
            if pairs.iter().any(|(k, v)| *k == StorageKey::AccessToken && v == "access-new")
                && pairs.iter().any(|(k, v)| *k == StorageKey::RefreshToken && v == "refresh-2")
    )));

    // The original request is replayed exactly once, with the new token.
    let mut replays = effects.http;
    assert_eq!(replays.len(), 1);
    assert!(replays[0].operation.url.ends_with("/parking-lots"));
    assert_eq!(
        replays[0].operation.headers.get("authorization"),
        Some("Bearer access-new")
    );

    let update = app
        .resolve(&mut replays[0], Ok(HttpResponse::new(200, lots_body())))
        .expect("resolve replay");
    feed(&app, update.events, &mut model);

    assert_eq!(model.lots.len(), 1);
    assert!(model.last_error.is_none());
}

#[test]
fn second_401_on_a_retried_request_is_terminal() {
    let app = AppTester::<App, _>::default();
    let mut model = authed_model();

    let update = app.update(Event::LotsRefreshRequested, &mut model);
    let mut requests = split(update.effects).http;
    let update = app
        .resolve(&mut requests[0], Ok(HttpResponse::new(401, vec![])))
        .expect("resolve 401");
    let mut refresh_requests = split(feed(&app, update.events, &mut model)).http;

    let update = app
        .resolve(
            &mut refresh_requests[0],
            Ok(HttpResponse::new(200, token_pair_body("access-new", "refresh-2"))),
        )
        .expect("resolve refresh");
    let mut replays = split(feed(&app, update.events, &mut model)).http;
    assert_eq!(replays.len(), 1);

    // The replay fails with 401 again: no second refresh, the failure is
    // classified and surfaced.
    let update = app
        .resolve(&mut replays[0], Ok(HttpResponse::new(401, vec![])))
        .expect("resolve second 401");
    let effects = split(feed(&app, update.events, &mut model));

    assert!(effects.http.is_empty());
    assert_eq!(
        model.last_error.as_ref().map(|e| e.code),
        Some(ApiErrorCode::Unauthorized)
    );
}

#[test]
fn refresh_failure_clears_all_tokens() {
    let app = AppTester::<App, _>::default();
    let mut model = authed_model();

    let update = app.update(Event::LotsRefreshRequested, &mut model);
    let mut requests = split(update.effects).http;
    let update = app
        .resolve(&mut requests[0], Ok(HttpResponse::new(401, vec![])))
        .expect("resolve 401");
    let mut refresh_requests = split(feed(&app, update.events, &mut model)).http;
    assert_eq!(refresh_requests.len(), 1);

    // The renewal call itself dies on the network.
    let update = app
        .resolve(
            &mut refresh_requests[0],
            Err(HttpError::Network {
                message: "connection reset".into(),
            }),
        )
        .expect("resolve refresh failure");
    let effects = split(feed(&app, update.events, &mut model));

    assert!(!model.session.is_authenticated());
    assert!(model.session.refresh_token().is_none());
    assert_eq!(model.auth_state, AuthState::Unauthenticated);
    assert!(!model.refresh.is_in_flight());

    // The waiter fails with the refresh error, not a generic one.
    assert_eq!(
        model.last_error.as_ref().map(|e| e.code),
        Some(ApiErrorCode::NetworkError)
    );

    // Stored tokens are removed; nothing is replayed.
    assert!(effects.kv.iter().any(|r| matches!(
        &r.operation,
        KvOperation::RemoveMulti { keys }
            if keys.contains(&StorageKey::AccessToken) && keys.contains(&StorageKey::RefreshToken)
    )));
    assert!(effects.http.is_empty());
}

#[test]
fn concurrent_401s_share_a_single_refresh() {
    let app = AppTester::<App, _>::default();
    let mut model = authed_model();

    let update = app.update(Event::LotsRefreshRequested, &mut model);
    let mut lots_request = split(update.effects).http;
    let update = app.update(Event::FavoritesRefreshRequested, &mut model);
    let mut favorites_request = split(update.effects).http;
    assert_eq!(lots_request.len(), 1);
    assert_eq!(favorites_request.len(), 1);

    // Both in-flight requests hit 401 back to back.
    let update = app
        .resolve(&mut lots_request[0], Ok(HttpResponse::new(401, vec![])))
        .expect("resolve first 401");
    let first_effects = split(feed(&app, update.events, &mut model));

    let update = app
        .resolve(&mut favorites_request[0], Ok(HttpResponse::new(401, vec![])))
        .expect("resolve second 401");
    let second_effects = split(feed(&app, update.events, &mut model));

    // Exactly one renewal call total; the second 401 queued on the first.
    let mut refresh_requests = first_effects.http;
    assert_eq!(refresh_requests.len(), 1);
    assert!(second_effects.http.is_empty());

    let update = app
        .resolve(
            &mut refresh_requests[0],
            Ok(HttpResponse::new(200, token_pair_body("access-new", "refresh-2"))),
        )
        .expect("resolve refresh");
    let effects = split(feed(&app, update.events, &mut model));

    // Both waiters are replayed with the new token.
    let replays = effects.http;
    assert_eq!(replays.len(), 2);
    for replay in &replays {
        assert_eq!(
            replay.operation.headers.get("authorization"),
            Some("Bearer access-new")
        );
    }
    let urls: Vec<&str> = replays.iter().map(|r| r.operation.url.as_str()).collect();
    assert!(urls.iter().any(|u| u.ends_with("/parking-lots")));
    assert!(urls.iter().any(|u| u.ends_with("/favorite-parking-lots")));
}

#[test]
fn missing_refresh_token_fails_without_a_renewal_call() {
    let app = AppTester::<App, _>::default();
    let mut model = Model::default();
    model.session = Session::with_tokens(Some("access-old".into()), None);
    model.auth_state = AuthState::Ready;

    let update = app.update(Event::LotsRefreshRequested, &mut model);
    let mut requests = split(update.effects).http;
    let update = app
        .resolve(&mut requests[0], Ok(HttpResponse::new(401, vec![])))
        .expect("resolve 401");
    let effects = split(feed(&app, update.events, &mut model));

    assert!(effects.http.is_empty());
    assert!(!model.refresh.is_in_flight());
    assert_eq!(
        model.last_error.as_ref().map(|e| e.code),
        Some(ApiErrorCode::Unauthorized)
    );
}

#[test]
fn undispatchable_renewal_ends_the_session_instead_of_wedging() {
    let app = AppTester::<App, _>::default();
    let mut model = Model::default();
    // A stored refresh token that can never form a valid header.
    model.session = Session::with_tokens(Some("access-old".into()), Some("r\r\nx".into()));
    model.auth_state = AuthState::Ready;

    let update = app.update(Event::LotsRefreshRequested, &mut model);
    let mut requests = split(update.effects).http;
    let update = app
        .resolve(&mut requests[0], Ok(HttpResponse::new(401, vec![])))
        .expect("resolve 401");
    let effects = split(feed(&app, update.events, &mut model));

    // No renewal call could go out, and nothing stays queued on it.
    assert!(effects.http.is_empty());
    assert!(!model.refresh.is_in_flight());
    assert!(!model.session.is_authenticated());
    assert_eq!(model.auth_state, AuthState::Unauthenticated);

    // The waiter fails with the construction error and stored tokens go.
    assert_eq!(
        model.last_error.as_ref().map(|e| e.code),
        Some(ApiErrorCode::UnknownError)
    );
    assert!(effects.kv.iter().any(|r| matches!(
        &r.operation,
        KvOperation::RemoveMulti { keys } if keys.contains(&StorageKey::RefreshToken)
    )));
}
