//! End-to-end dispatch behavior through the public API: route resolution,
//! middleware accumulation order, short-circuiting, and the error taxonomy.

use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tansu::{
    CallError, Context, Middleware, Next, NoopSink, Procedure, Router, RpcError, SharedSink,
    schema,
};

#[derive(Deserialize, Serialize)]
struct EchoInput {
    message: String,
}

#[derive(Deserialize, Serialize)]
struct EchoOutput {
    result: String,
}

fn sink() -> SharedSink {
    Arc::new(NoopSink)
}

fn echo() -> Procedure {
    Procedure::new(
        schema::typed::<EchoInput>(),
        schema::typed::<EchoOutput>(),
        |_ctx: Context, input: Value, _sink: SharedSink| async move {
            json!({"result": format!("Echo: {}", input["message"].as_str().unwrap())})
        },
    )
}

fn tracer(log: Arc<Mutex<Vec<&'static str>>>, label: &'static str) -> impl Middleware {
    move |ctx: Context, input: Value, _sink: SharedSink, next: Next| {
        let log = Arc::clone(&log);
        async move {
            log.lock().unwrap().push(label);
            next.run(ctx, input).await
        }
    }
}

#[tokio::test]
async fn echo_round_trip() {
    let app = Router::new().route("echo", echo());
    let out = app
        .call(json!({}), "echo", json!({"message": "Hello World"}), sink())
        .await
        .unwrap();
    assert_eq!(out, json!({"result": "Echo: Hello World"}));
}

#[tokio::test]
async fn slash_and_dot_paths_are_equivalent() {
    let app = Router::new().route("v1", Router::new().route("echo", echo()));
    let input = json!({"message": "hi"});

    let dotted = app.call(json!({}), "v1.echo", input.clone(), sink()).await.unwrap();
    let slashed = app.call(json!({}), "v1/echo", input, sink()).await.unwrap();
    assert_eq!(dotted, slashed);
}

#[tokio::test]
async fn unresolved_first_segment_is_404_at_every_level() {
    let app = Router::new().route("v1", Router::new().route("echo", echo()));

    for path in ["nope", "v1.nope", "v1.nope.deeper"] {
        let err = app.call(json!({}), path, Value::Null, sink()).await.unwrap_err();
        assert!(matches!(&err, CallError::Rpc(e) if e.code == 404), "path {path}: {err:?}");
    }
}

#[tokio::test]
async fn residual_segments_past_a_procedure_are_400() {
    let app = Router::new().route("echo", echo());
    let err = app.call(json!({}), "echo.extra", Value::Null, sink()).await.unwrap_err();
    assert!(matches!(&err, CallError::Rpc(e) if e.code == 400), "{err:?}");
}

#[tokio::test]
async fn full_accumulation_order_and_idempotence() {
    let log = Arc::new(Mutex::new(Vec::new()));

    let get = Procedure::new(
        schema::any(),
        schema::any(),
        {
            let log = Arc::clone(&log);
            move |_ctx: Context, input: Value, _sink: SharedSink| {
                let log = Arc::clone(&log);
                async move {
                    log.lock().unwrap().push("handler");
                    input
                }
            }
        },
    )
    .wrap(tracer(Arc::clone(&log), "leaf"));

    let app = Router::new().route(
        "v1",
        Router::new()
            .wrap(tracer(Arc::clone(&log), "v1-a"))
            .wrap(tracer(Arc::clone(&log), "v1-b"))
            .route(
                "users",
                Router::new().wrap(tracer(Arc::clone(&log), "users")).route(
                    "profile",
                    Router::new().wrap(tracer(Arc::clone(&log), "profile")).route("get", get),
                ),
            ),
    );

    let per_call = ["v1-a", "v1-b", "users", "profile", "leaf", "handler"];
    for n in 1..=4 {
        app.call(json!({}), "v1.users.profile.get", Value::Null, sink()).await.unwrap();
        let expected: Vec<&str> = std::iter::repeat(per_call).take(n).flatten().collect();
        assert_eq!(*log.lock().unwrap(), expected, "after call {n}");
    }
}

#[tokio::test]
async fn auth_middleware_short_circuits_with_its_own_error() {
    let handled = Arc::new(Mutex::new(false));

    let login = Procedure::new(schema::any(), schema::any(), {
        let handled = Arc::clone(&handled);
        move |_ctx: Context, input: Value, _sink: SharedSink| {
            let handled = Arc::clone(&handled);
            async move {
                *handled.lock().unwrap() = true;
                input
            }
        }
    });

    let app = Router::new().route(
        "auth",
        Router::new()
            .wrap(|ctx: Context, input: Value, _sink: SharedSink, next: Next| async move {
                match ctx["token"].as_str() {
                    Some("valid") => next.run(ctx, input).await,
                    _ => Err(RpcError::new(401, "Authentication required").into()),
                }
            })
            .route("login", login),
    );

    let err = app.call(json!({}), "auth.login", json!({}), sink()).await.unwrap_err();
    assert_eq!(err, CallError::Rpc(RpcError::new(401, "Authentication required")));
    assert!(!*handled.lock().unwrap());

    let out = app
        .call(json!({"token": "valid"}), "auth.login", json!({"ok": true}), sink())
        .await
        .unwrap();
    assert_eq!(out, json!({"ok": true}));
    assert!(*handled.lock().unwrap());
}

#[tokio::test]
async fn validation_failures_stay_distinct_from_tagged_errors() {
    let app = Router::new().route("echo", echo());

    let err = app
        .call(json!({}), "echo", json!({"message": 42}), sink())
        .await
        .unwrap_err();
    assert!(matches!(&err, CallError::Validation(_)), "{err:?}");
}

#[tokio::test]
async fn concurrent_calls_share_the_tree_without_interference() {
    let app = Arc::new(Router::new().route("echo", echo()));

    let mut handles = Vec::new();
    for i in 0..32 {
        let app = Arc::clone(&app);
        handles.push(tokio::spawn(async move {
            app.call(json!({}), "echo", json!({"message": i.to_string()}), sink()).await
        }));
    }

    for (i, handle) in handles.into_iter().enumerate() {
        let out = handle.await.unwrap().unwrap();
        assert_eq!(out, json!({"result": format!("Echo: {i}")}));
    }
}
