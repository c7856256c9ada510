use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use retecore::{
    Engine, ErrorKind, ReteError, ReteResult,
    base::value::Value,
    events::{
        Diagnostic, Direction, EventMask, FunctionTrigger, LogTracer, NodeEvent, SubscriberFailure,
    },
    network::{Network, adapter::RightToLeft, node1::TypeTest},
    tests_utils::{RecordingSink, animal_engine, fact},
    utils::conf::EngineConfig,
};

fn dog_network(engine: &Engine) -> (Network, retecore::network::NodeId) {
    let mut network = Network::new();
    let dogs = network.add_root(engine, TypeTest::new("Dog"));
    let sink = network.add_sink(engine, dogs, RecordingSink::new()).unwrap();
    (network, sink)
}

#[test]
fn events_precede_node_work() {
    let engine = animal_engine();
    let (network, _) = dog_network(&engine);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    engine.events().subscribe(
        EventMask::ALL,
        Arc::new(move |event: &NodeEvent<'_>, _: &Engine| -> ReteResult<()> {
            log.lock().unwrap().push(event.node.to_string());
            Ok(())
        }),
    );

    let rex = fact(&engine, "Dog", vec![Value::atom("Rex"), Value::atom("lab")]);
    network.assert_fact(&engine, rex).unwrap();
    assert_eq!(
        *seen.lock().unwrap(),
        ["[TypeTest template=Dog]", "[Sink recording]"]
    );
}

#[test]
fn masks_select_directions() {
    let engine = animal_engine();
    let mut network = Network::new();
    let reverse = network.add_root(&engine, RightToLeft);
    network.add_sink(&engine, reverse, RecordingSink::new()).unwrap();

    let lefts = Arc::new(AtomicUsize::new(0));
    let counter = lefts.clone();
    engine.events().subscribe(
        EventMask::CALL_LEFT,
        Arc::new(move |event: &NodeEvent<'_>, _: &Engine| -> ReteResult<()> {
            assert_eq!(event.direction, Direction::Left);
            counter.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }),
    );
    assert!(!engine.events().wants(Direction::Right));

    let rex = fact(&engine, "Dog", vec![Value::atom("Rex"), Value::atom("lab")]);
    network.assert_fact(&engine, rex).unwrap();
    assert_eq!(lefts.load(Ordering::Relaxed), 1);
}

#[test]
fn subscriber_failures_are_diverted() {
    let engine = animal_engine();
    let (network, sink) = dog_network(&engine);
    let diagnostics = Arc::new(Mutex::new(Vec::new()));
    let reports = diagnostics.clone();
    engine
        .events()
        .set_diagnostic_sink(Arc::new(move |diagnostic: &Diagnostic| {
            let panicked = matches!(diagnostic.failure, SubscriberFailure::Panic(_));
            reports.lock().unwrap().push(panicked);
        }));

    engine.events().subscribe(
        EventMask::CALL_RIGHT,
        Arc::new(|_: &NodeEvent<'_>, _: &Engine| -> ReteResult<()> {
            Err(ReteError::new(ErrorKind::Other("subscriber failed".to_string())))
        }),
    );
    engine.events().subscribe(
        EventMask::CALL_RIGHT,
        Arc::new(|_: &NodeEvent<'_>, _: &Engine| -> ReteResult<()> {
            panic!("subscriber panicked")
        }),
    );

    let rex = fact(&engine, "Dog", vec![Value::atom("Rex"), Value::atom("lab")]);
    network.assert_fact(&engine, rex).unwrap();

    assert_eq!(network.sink_as::<RecordingSink>(sink).unwrap().len(), 1);
    // Two vertices, two failing subscribers each.
    assert_eq!(*diagnostics.lock().unwrap(), [false, true, false, true]);
}

#[test]
fn unsubscribe_and_disabled_broadcast() {
    let calls = Arc::new(AtomicUsize::new(0));
    let handler = {
        let calls = calls.clone();
        Arc::new(move |_: &NodeEvent<'_>, _: &Engine| -> ReteResult<()> {
            calls.fetch_add(1, Ordering::Relaxed);
            Ok(())
        })
    };

    let engine = animal_engine();
    let (network, _) = dog_network(&engine);
    let id = engine.events().subscribe(EventMask::ALL, handler.clone());
    network.flush(&engine).unwrap();
    assert_eq!(calls.load(Ordering::Relaxed), 2);
    assert!(engine.events().unsubscribe(id));
    assert!(!engine.events().unsubscribe(id));
    network.flush(&engine).unwrap();
    assert_eq!(calls.load(Ordering::Relaxed), 2);

    let quiet = Engine::new(EngineConfig {
        broadcast_events: false,
        ..Default::default()
    });
    quiet.templates().define("Dog", None, &["name", "breed"]).unwrap();
    let (network, _) = dog_network(&quiet);
    quiet.events().subscribe(EventMask::ALL, handler);
    network.flush(&quiet).unwrap();
    assert_eq!(calls.load(Ordering::Relaxed), 2);
}

#[test]
fn subscribers_may_subscribe_during_broadcast() {
    let engine = animal_engine();
    let (network, _) = dog_network(&engine);
    engine.events().subscribe(
        EventMask::CALL_RIGHT,
        Arc::new(|_: &NodeEvent<'_>, engine: &Engine| -> ReteResult<()> {
            engine.events().subscribe(EventMask::ALL, Arc::new(LogTracer));
            Ok(())
        }),
    );
    network.flush(&engine).unwrap();
    // Original subscriber plus one tracer per visited vertex.
    assert_eq!(engine.events().len(), 3);
}

#[test]
fn function_trigger_calls_engine_functions() {
    let engine = animal_engine();
    let (network, _) = dog_network(&engine);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let log = seen.clone();
    engine.functions().define_fn("watch", move |args, _| {
        log.lock().unwrap().push(args.to_vec());
        Ok(Value::true_atom())
    });
    engine
        .events()
        .subscribe(EventMask::CALL_RIGHT, Arc::new(FunctionTrigger::new("watch")));

    let rex = fact(&engine, "Dog", vec![Value::atom("Rex"), Value::atom("lab")]);
    network.assert_fact(&engine, rex.clone()).unwrap();
    network.flush(&engine).unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 4);
    assert_eq!(seen[0][0], Value::atom("right"));
    assert_eq!(seen[0][1].kind(), retecore::base::value::ValueKind::Long);
    assert_eq!(seen[0][2], Value::Fact(rex));
    assert_eq!(seen[2][2], Value::nil());
}
