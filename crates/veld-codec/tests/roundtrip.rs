use std::sync::Arc;

use serde_json::json;

use veld_codec::{Flavor, Serializer};
use veld_model::{
    ArrayDef, FieldDef, Primitive, SchemaRegistry, Timestamp, TypeDef, Value, VariantDef,
};

fn registry() -> Arc<SchemaRegistry> {
    Arc::new(
        SchemaRegistry::builder()
            .struct_def(
                "user.veld:User",
                vec![
                    FieldDef::new("user_id", 0, TypeDef::Primitive(Primitive::Int64)),
                    FieldDef::new("name", 1, TypeDef::Primitive(Primitive::String)),
                    FieldDef::new("quote", 2, TypeDef::Primitive(Primitive::String)),
                    FieldDef::new(
                        "pets",
                        3,
                        TypeDef::Array(ArrayDef {
                            item: Box::new(TypeDef::Record("user.veld:User.Pet".to_string())),
                            key_field: None,
                        }),
                    ),
                    FieldDef::new(
                        "subscription_status",
                        4,
                        TypeDef::Record("user.veld:User.SubscriptionStatus".to_string()),
                    ),
                ],
            )
            .struct_def(
                "user.veld:User.Pet",
                vec![
                    FieldDef::new("name", 0, TypeDef::Primitive(Primitive::String)),
                    FieldDef::new("height_in_meters", 1, TypeDef::Primitive(Primitive::Float32)),
                    FieldDef::new("picture", 2, TypeDef::Primitive(Primitive::String)),
                ],
            )
            .struct_def(
                "user.veld:Trial",
                vec![FieldDef::new(
                    "start_time",
                    0,
                    TypeDef::Primitive(Primitive::Timestamp),
                )],
            )
            .enum_def(
                "user.veld:User.SubscriptionStatus",
                vec![
                    VariantDef::constant("FREE", 1),
                    VariantDef::constant("PREMIUM", 2),
                    VariantDef::data("trial", 3, TypeDef::Record("user.veld:Trial".to_string())),
                ],
            )
            .struct_def(
                "misc.veld:Scalars",
                vec![
                    FieldDef::new("flag", 0, TypeDef::Primitive(Primitive::Bool)),
                    FieldDef::new("small", 1, TypeDef::Primitive(Primitive::Int32)),
                    FieldDef::new("big", 2, TypeDef::Primitive(Primitive::Int64)),
                    FieldDef::new("wide", 3, TypeDef::Primitive(Primitive::Uint64)),
                    FieldDef::new("ratio", 4, TypeDef::Primitive(Primitive::Float64)),
                    FieldDef::new("blob", 5, TypeDef::Primitive(Primitive::Bytes)),
                    FieldDef::new("at", 6, TypeDef::Primitive(Primitive::Timestamp)),
                ],
            )
            .build()
            .unwrap(),
    )
}

#[test]
fn dense_encoding_drops_trailing_defaults() {
    let reg = registry();
    let john = reg
        .new_struct(
            "user.veld:User",
            vec![("user_id", 42i64.into()), ("name", "John Doe".into())],
        )
        .unwrap();

    let s = Serializer::for_record(&reg, "user.veld:User").unwrap();
    assert_eq!(s.to_json(&john.clone().into(), Flavor::Dense), json!([42, "John Doe"]));
    assert_eq!(
        s.to_json(&john.into(), Flavor::Readable),
        json!({"user_id": 42, "name": "John Doe"})
    );
}

#[test]
fn dense_keeps_in_range_defaults() {
    let reg = registry();
    // user_id stays default, quote is set: slots 0..=2 all appear.
    let u = reg
        .new_struct("user.veld:User", vec![("quote", "hi".into())])
        .unwrap();
    let s = Serializer::for_record(&reg, "user.veld:User").unwrap();
    assert_eq!(s.to_json(&u.into(), Flavor::Dense), json!([0, "", "hi"]));
}

#[test]
fn empty_struct_encodes_to_an_empty_array() {
    let reg = registry();
    let d = reg.default_struct("user.veld:User").unwrap();
    let s = Serializer::for_record(&reg, "user.veld:User").unwrap();
    assert_eq!(s.to_json(&d.clone().into(), Flavor::Dense), json!([]));
    assert_eq!(s.to_json(&d.into(), Flavor::Readable), json!({}));
}

#[test]
fn both_flavors_round_trip_a_full_tree() {
    let reg = registry();
    let trial = reg
        .enum_create(
            "user.veld:User.SubscriptionStatus",
            "trial",
            vec![("start_time", Timestamp::from_unix_millis(1743592409000).into())],
        )
        .unwrap();
    let cheeta = reg
        .new_struct(
            "user.veld:User.Pet",
            vec![
                ("name", "Cheeta".into()),
                ("height_in_meters", 1.67f32.into()),
                ("picture", "🐒".into()),
            ],
        )
        .unwrap();
    let tarzan = reg
        .new_struct(
            "user.veld:User",
            vec![
                ("user_id", 123i64.into()),
                ("name", "Tarzan".into()),
                ("quote", "AAAAaAaAaAy".into()),
                ("pets", Value::array(vec![cheeta.into()]).into()),
                ("subscription_status", trial.into()),
            ],
        )
        .unwrap();
    let tarzan = Value::Struct(tarzan);

    let s = Serializer::for_record(&reg, "user.veld:User").unwrap();
    for flavor in [Flavor::Dense, Flavor::Readable] {
        let decoded = s.from_json(&s.to_json(&tarzan, flavor)).unwrap();
        assert_eq!(decoded, tarzan, "{flavor:?} round trip");

        let decoded = s
            .from_json_code(&s.to_json_code(&tarzan, flavor).unwrap())
            .unwrap();
        assert_eq!(decoded, tarzan, "{flavor:?} text round trip");
    }
}

#[test]
fn enum_wire_forms() {
    let reg = registry();
    let s = Serializer::for_record(&reg, "user.veld:User.SubscriptionStatus").unwrap();

    let free = Value::Enum(reg.enum_constant("user.veld:User.SubscriptionStatus", "FREE").unwrap());
    assert_eq!(s.to_json(&free, Flavor::Dense), json!(1));
    assert_eq!(s.to_json(&free, Flavor::Readable), json!("FREE"));

    let unknown = Value::Enum(reg.enum_unknown("user.veld:User.SubscriptionStatus").unwrap());
    assert_eq!(s.to_json(&unknown, Flavor::Dense), json!(0));
    assert_eq!(s.to_json(&unknown, Flavor::Readable), json!("?"));

    let trial = Value::Enum(
        reg.enum_create(
            "user.veld:User.SubscriptionStatus",
            "trial",
            vec![("start_time", Timestamp::from_unix_millis(1000).into())],
        )
        .unwrap(),
    );
    assert_eq!(s.to_json(&trial, Flavor::Dense), json!([3, [1000]]));
    assert_eq!(
        s.to_json(&trial, Flavor::Readable),
        json!({"trial": {"start_time": {"unix_millis": 1000, "formatted": "1970-01-01T00:00:01.000Z"}}})
    );

    for v in [&free, &unknown, &trial] {
        for flavor in [Flavor::Dense, Flavor::Readable] {
            assert_eq!(&s.from_json(&s.to_json(v, flavor)).unwrap(), v);
        }
    }
}

#[test]
fn scalar_wire_forms_round_trip() {
    let reg = registry();
    let v = reg
        .new_struct(
            "misc.veld:Scalars",
            vec![
                ("flag", true.into()),
                ("small", (-7i32).into()),
                ("big", 9_007_199_254_740_993i64.into()),
                ("wide", u64::MAX.into()),
                ("ratio", f64::NAN.into()),
                ("blob", vec![0u8, 1, 254, 255].into()),
                ("at", Timestamp::from_unix_millis(1743592409123).into()),
            ],
        )
        .unwrap();
    let v = Value::Struct(v);
    let s = Serializer::for_record(&reg, "misc.veld:Scalars").unwrap();

    let dense = s.to_json(&v, Flavor::Dense);
    // 64-bit values beyond 2^53 travel as strings; NaN as a marker string.
    assert_eq!(
        dense,
        json!([true, -7, "9007199254740993", "18446744073709551615", "NaN", "AAH+/w==", 1743592409123i64])
    );
    assert_eq!(s.from_json(&dense).unwrap(), v);
    assert_eq!(s.from_json(&s.to_json(&v, Flavor::Readable)).unwrap(), v);
}

#[test]
fn bool_decode_tolerates_zero_and_one() {
    let reg = registry();
    let s = Serializer::for_record(&reg, "misc.veld:Scalars").unwrap();
    let decoded = s.from_json(&json!([1])).unwrap();
    assert_eq!(
        decoded.as_struct().unwrap().get("flag").unwrap().as_bool(),
        Some(true)
    );
    let decoded = s.from_json(&json!([0])).unwrap();
    assert_eq!(
        decoded.as_struct().unwrap().get("flag").unwrap().as_bool(),
        Some(false)
    );
}

#[test]
fn malformed_payloads_are_decode_failures() {
    let reg = registry();
    let s = Serializer::for_record(&reg, "user.veld:User").unwrap();

    // Wrong JSON shape for the root struct.
    assert!(s.from_json(&json!("nope")).is_err());
    // Wrong primitive shape inside a field.
    assert!(s.from_json(&json!([{"x": 1}])).is_err());
    // Out-of-range int32.
    let s = Serializer::for_record(&reg, "misc.veld:Scalars").unwrap();
    assert!(s.from_json(&json!([false, 4294967296i64])).is_err());
    // Invalid JSON text.
    assert!(s.from_json_code("{oops").is_err());
}

#[test]
fn readable_output_is_pretty_printed() {
    let reg = registry();
    let john = reg
        .new_struct("user.veld:User", vec![("user_id", 42i64.into())])
        .unwrap();
    let s = Serializer::for_record(&reg, "user.veld:User").unwrap();
    let code = s.to_json_code(&john.into(), Flavor::Readable).unwrap();
    assert!(code.contains('\n'), "expected pretty JSON, got {code}");
    assert_eq!(
        serde_json::from_str::<serde_json::Value>(&code).unwrap(),
        json!({"user_id": 42})
    );
}
