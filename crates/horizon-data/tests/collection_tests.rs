//! Tests for collection membership, relaying and embedding.

use std::sync::Arc;

use parking_lot::Mutex;

use horizon_data::{
    Attribute, Collection, CollectionClass, Event, MemoryProxy, ModelClass, PersistOptions, Value,
};

fn item_class() -> ModelClass {
    ModelClass::builder("Entry")
        .attributes(["id", "attr"])
        .build()
        .unwrap()
}

fn entries(class: &ModelClass) -> CollectionClass {
    CollectionClass::builder("Entries").model_class(class).build()
}

fn event_log(collection: &Collection, name: &str) -> Arc<Mutex<Vec<Vec<Value>>>> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    collection.on(name, move |event: &Event| sink.lock().push(event.args.clone()));
    log
}

#[test]
fn test_remove_updates_every_index() {
    let class = item_class();
    let collection = Collection::new(&entries(&class));
    let m1 = class.new_model(Value::object([("attr", 1)])).unwrap();
    let m2 = class.new_model(Value::object([("attr", 2)])).unwrap();

    collection.add(vec![m1.clone(), m2.clone()]).unwrap();
    let removed = event_log(&collection, "remove");
    collection.remove(&m1);

    assert_eq!(collection.get_count(), 1);
    assert!(!collection.has(&m1));
    assert!(collection.get_by_client_id(m1.client_id()).is_none());
    assert_eq!(collection.index_of(&m1), None);
    assert_eq!(collection.index_of(&m2), Some(0));
    assert_eq!(removed.lock().len(), 1);
    assert_eq!(removed.lock()[0][1], Value::from(vec![m1.clone()]));

    // Removing a non-member fires nothing.
    collection.remove(&m1);
    assert_eq!(removed.lock().len(), 1);
}

#[test]
fn test_member_events_are_relayed_once_while_member() {
    let class = item_class();
    let collection = Collection::new(&entries(&class));
    let model = collection
        .add(Value::object([("attr", 1)]))
        .unwrap()
        .remove(0);
    let relayed = event_log(&collection, "change:attr");

    model.set("attr", 2).unwrap();
    {
        let relayed = relayed.lock();
        assert_eq!(relayed.len(), 1);
        assert_eq!(
            relayed[0],
            vec![
                Value::from(&collection),
                Value::from(&model),
                Value::from(2),
                Value::from(1),
            ]
        );
    }

    collection.remove(&model);
    model.set("attr", 3).unwrap();
    model.fire_event("change:attr", vec![Value::from(4), Value::from(3)]);
    assert_eq!(relayed.lock().len(), 1);
}

#[test]
fn test_custom_member_events_are_relayed() {
    let class = item_class();
    let collection = Collection::new(&entries(&class));
    let model = class.new_model(Value::Undefined).unwrap();
    collection.add(&model).unwrap();
    let relayed = event_log(&collection, "ping");

    model.fire_event("ping", vec![Value::from("payload")]);

    assert_eq!(
        *relayed.lock(),
        vec![vec![
            Value::from(&collection),
            Value::from(&model),
            Value::from("payload"),
        ]]
    );
}

#[test]
fn test_relayed_veto_reaches_member() {
    let class = item_class();
    let collection = Collection::new(&entries(&class));
    let model = class.new_model(Value::Undefined).unwrap();
    collection.add(&model).unwrap();
    collection.on("guarded", |_: &Event| false);

    // The relay runs as an `all` listener, whose result does not count.
    assert!(model.fire_event("guarded", Vec::new()));
}

#[test]
fn test_destroyed_member_leaves_collection_before_destroy() {
    let proxy = Arc::new(MemoryProxy::new());
    let class = ModelClass::builder("Disposable")
        .attribute("id")
        .proxy(proxy.clone())
        .build()
        .unwrap();
    proxy.insert_record("1", serde_json::json!({"id": 1}));
    let collection = Collection::new(&entries(&class));
    let model = collection
        .add(Value::object([("id", 1)]))
        .unwrap()
        .remove(0);

    let order = Arc::new(Mutex::new(Vec::new()));
    let sink = order.clone();
    collection.on("remove", move |_: &Event| sink.lock().push("collection remove"));
    let sink = order.clone();
    collection.on("destroy", move |_: &Event| sink.lock().push("collection destroy"));
    let sink = order.clone();
    model.on("destroy", move |_: &Event| sink.lock().push("model destroy"));

    model.destroy(PersistOptions::new()).unwrap();

    assert_eq!(*order.lock(), vec!["collection remove", "model destroy"]);
    assert_eq!(collection.get_count(), 0);
    assert!(collection.get_by_id(1).is_none());
}

#[test]
fn test_embedded_collection_marks_parent_modified() {
    let line = ModelClass::builder("Line")
        .attributes(["id", "qty"])
        .build()
        .unwrap();
    let lines = CollectionClass::builder("Lines").model_class(&line).build();
    let order = ModelClass::builder("Order")
        .attribute(Attribute::collection("lines").collection_class(&lines).embedded(true))
        .build()
        .unwrap();

    let model = order
        .new_model(Value::object([(
            "lines",
            Value::array([Value::object([("qty", 1)])]),
        )]))
        .unwrap();
    let nested = model.get("lines").unwrap();
    let nested = nested.as_collection().unwrap().clone();
    assert_eq!(nested.get_count(), 1);
    assert!(!model.is_modified("lines"));

    let changes = Arc::new(Mutex::new(0));
    let sink = changes.clone();
    model.on("change:lines", move |_: &Event| *sink.lock() += 1);

    nested.add(Value::object([("qty", 2)])).unwrap();
    assert_eq!(*changes.lock(), 1);
    assert!(model.is_modified("lines"));

    nested.get_first().unwrap().set("qty", 5).unwrap();
    assert_eq!(*changes.lock(), 2);

    model.commit();
    assert!(!nested.is_modified());
    assert!(!model.is_modified("lines"));
}

#[test]
fn test_array_without_collection_class_uses_base_class() {
    let holder = ModelClass::builder("Bag")
        .attribute(Attribute::collection("things"))
        .build()
        .unwrap();
    let item = item_class().new_model(Value::Undefined).unwrap();
    let model = holder
        .new_model(Value::object([("things", Value::array([Value::from(&item)]))]))
        .unwrap();

    let things = model.get("things").unwrap();
    let things = things.as_collection().unwrap();
    assert!(things.class().ptr_eq(&CollectionClass::base()));
    assert!(things.has(&item));
}

#[test]
fn test_get_data_flattens_members() {
    let class = item_class();
    let collection = entries(&class)
        .create(vec![
            Value::object([("id", Value::from(1)), ("attr", Value::from("a"))]),
            Value::object([("id", Value::from(2)), ("attr", Value::from("b"))]),
        ])
        .unwrap();

    let data = collection.get_data(&Default::default());
    assert_eq!(
        data.to_json().unwrap(),
        serde_json::json!([{"id": 1, "attr": "a"}, {"id": 2, "attr": "b"}])
    );
}
