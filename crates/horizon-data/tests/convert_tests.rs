//! Tests for flattening model graphs.

use horizon_data::convert::{convert_model, convert_collection};
use horizon_data::{
    Attribute, Collection, CollectionClass, ConvertOptions, DataError, ModelClass, Value,
};

fn linked_class() -> ModelClass {
    ModelClass::builder("Linked")
        .attribute("id")
        .attribute("name")
        .attribute(Attribute::model("other"))
        .build()
        .unwrap()
}

#[test]
fn test_cycles_convert_to_shared_containers() {
    let class = linked_class();
    let a = class.new_model(Value::object([("name", "a")])).unwrap();
    let b = class.new_model(Value::object([("name", "b")])).unwrap();
    a.set("other", &b).unwrap();
    b.set("other", &a).unwrap();

    let result = convert_model(&a, &ConvertOptions::default());
    let other = result.get("other").unwrap();
    let back = other.get("other").unwrap();

    assert!(back.as_object().unwrap().ptr_eq(&result));
    assert_eq!(
        other.get("name").and_then(|v| v.to_primitive()),
        Some(Value::from("b"))
    );
    assert_eq!(result.to_json(), Err(DataError::CircularStructure));
}

#[test]
fn test_shared_child_is_one_container() {
    let class = linked_class();
    let child = class.new_model(Value::Undefined).unwrap();
    let holder = ModelClass::builder("TwoRefs")
        .attribute(Attribute::model("left"))
        .attribute(Attribute::model("right"))
        .build()
        .unwrap();
    let model = holder
        .new_model(Value::object([
            ("left", Value::from(&child)),
            ("right", Value::from(&child)),
        ]))
        .unwrap();

    let result = convert_model(&model, &ConvertOptions::default());
    let left = result.get("left").unwrap();
    let right = result.get("right").unwrap();
    assert!(left.ptr_eq(&right));
    assert!(result.to_json().is_ok());
}

#[test]
fn test_attribute_names_restrict_root_only() {
    let class = linked_class();
    let child = class.new_model(Value::object([("name", "child")])).unwrap();
    let root = class
        .new_model(Value::object([
            ("name", Value::from("root")),
            ("other", Value::from(&child)),
        ]))
        .unwrap();

    let options = ConvertOptions::default().with_attribute_names(["other"]);
    let json = convert_model(&root, &options).to_json().unwrap();
    assert_eq!(
        json,
        // Unset attributes of the child are omitted.
        serde_json::json!({"other": {"name": "child"}})
    );
}

#[test]
fn test_raw_persistence_forms() {
    let tag = ModelClass::builder("Tag")
        .attribute("id")
        .attribute("label")
        .build()
        .unwrap();
    let tags = CollectionClass::builder("Tags").model_class(&tag).build();
    let post = ModelClass::builder("Post")
        .attribute("id")
        .attribute(Attribute::model("author").model_class(&tag).persist_id_only(true))
        .attribute(Attribute::collection("tags").collection_class(&tags))
        .attribute(Attribute::mixed("draft").persist(false))
        .build()
        .unwrap();

    let model = post
        .new_model(Value::object([
            ("id", Value::from(1)),
            ("author", Value::object([("id", Value::from(9)), ("label", Value::from("me"))])),
            (
                "tags",
                Value::array([
                    Value::object([("id", Value::from(3)), ("label", Value::from("x"))]),
                    Value::object([("id", Value::from(4)), ("label", Value::from("y"))]),
                ]),
            ),
            ("draft", Value::from(true)),
        ]))
        .unwrap();

    let json = model
        .get_data(&ConvertOptions::persisted_raw())
        .to_json()
        .unwrap();
    assert_eq!(
        json,
        serde_json::json!({"id": 1, "author": 9, "tags": [{"id": 3}, {"id": 4}]})
    );

    let full = model.get_data(&ConvertOptions::default()).to_json().unwrap();
    assert_eq!(full["author"]["label"], serde_json::json!("me"));
    assert_eq!(full["tags"][1]["label"], serde_json::json!("y"));
    assert_eq!(full["draft"], serde_json::json!(true));
}

#[test]
fn test_collection_conversion() {
    let class = linked_class();
    let collection = Collection::new(&CollectionClass::builder("Links").model_class(&class).build());
    let a = collection.add(Value::object([("name", "a")])).unwrap().remove(0);
    let b = collection.add(Value::object([("name", "b")])).unwrap().remove(0);
    a.set("other", &b).unwrap();

    let array = convert_collection(&collection, &ConvertOptions::default());
    assert_eq!(array.len(), 2);
    let first_other = array.get(0).and_then(|a| a.get("other")).unwrap();
    let second = array.get(1).unwrap();
    assert!(first_other.ptr_eq(&second));
}

#[test]
fn test_dates_serialize_as_rfc3339() {
    let class = ModelClass::builder("Dated")
        .attribute(Attribute::date("at"))
        .build()
        .unwrap();
    let model = class
        .new_model(Value::object([("at", "2024-03-01T12:30:00Z")]))
        .unwrap();
    let json = model.get_data(&ConvertOptions::default()).to_json().unwrap();
    assert_eq!(json["at"], serde_json::json!("2024-03-01T12:30:00+00:00"));
}
