use std::collections::HashMap;
use std::sync::mpsc::Sender;
use std::sync::Mutex;

use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use sqlrow::prelude::*;

#[derive(Record, Debug, Default, PartialEq)]
pub struct Address {
    pub street: String,
    #[sql("town")]
    pub city: String,
}

#[derive(Record, Debug, Default, PartialEq)]
pub struct Audit {
    pub created_at: chrono::DateTime<Utc>,
    #[sql("version")]
    pub rev: i32,
}

#[derive(Record, Debug, Default)]
pub struct Customer {
    #[sql("pk autoincr")]
    pub id: i64,
    #[sql("'full name'")]
    pub name: String,
    pub home_address: Address,
    pub billing: Option<Address>,
    #[sql(flatten)]
    pub audit: Audit,
    #[sql("json")]
    pub tags: Vec<String>,
    pub attributes: HashMap<String, String>,
    pub avatar: Vec<u8>,
    #[sql("emptynull")]
    pub nickname: String,
    #[sql("-")]
    pub session: Option<Sender<String>>,
    secret: String,
}

#[derive(Record, Default)]
pub struct Counter {
    #[sql("pk")]
    pub id: u64,
    pub slot: usize,
    pub grade: char,
    #[sql("'a json b'")]
    pub label: String,
    hits: Mutex<u32>,
}

fn customer() -> Customer {
    Customer {
        id: 42,
        name: "Ann".into(),
        home_address: Address {
            street: "1 Main St".into(),
            city: "Springfield".into(),
        },
        billing: None,
        audit: Audit {
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
            rev: 3,
        },
        tags: vec!["vip".into()],
        attributes: HashMap::new(),
        avatar: vec![1, 2, 3],
        nickname: String::new(),
        session: None,
        secret: "hunter2".into(),
    }
}

#[test]
fn test_derived_columns() {
    let schema = Schema::default();
    let model = schema.columns::<Customer>().unwrap();
    assert_eq!(
        model.column_names(Convention::Snake),
        vec![
            "id",
            "full name",
            "home_address_street",
            "home_address_town",
            "billing_street",
            "billing_town",
            "created_at",
            "rev",
            "tags",
            "avatar",
            "nickname",
        ]
    );
}

#[test]
fn test_same_convention_keeps_field_names() {
    let schema = Schema::new(Dialect::Ansi, Convention::Same);
    let model = schema.columns::<Customer>().unwrap();
    assert_eq!(model.columns()[2].column_name(Convention::Same), "home_addressstreet");
}

#[test]
fn test_insert_values() {
    let schema = Schema::new(Dialect::Postgres, Convention::Snake);
    let insert = schema.insert::<Customer>("customers").unwrap();
    assert_eq!(
        insert.sql(),
        concat!(
            r#"insert into "customers" ("full name","home_address_street","home_address_town","#,
            r#""billing_street","billing_town","created_at","rev","tags","avatar","nickname") "#,
            "values ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)"
        )
    );

    let args = insert.args(&customer()).unwrap();
    assert_eq!(
        args,
        vec![
            Value::Text("Ann".into()),
            Value::Text("1 Main St".into()),
            Value::Text("Springfield".into()),
            Value::Null,
            Value::Null,
            Value::Timestamp(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()),
            Value::Int(3),
            Value::Json(serde_json::json!(["vip"])),
            Value::Bytes(vec![1, 2, 3]),
            Value::Null,
        ]
    );
}

#[test]
fn test_present_optional_record() {
    let schema = Schema::new(Dialect::MySql, Convention::Snake);
    let stmt = schema
        .prepare::<Customer>("update customers set billing_town = ? where {}")
        .unwrap();
    assert_eq!(stmt.sql(), "update customers set billing_town = ? where `id`=?");

    let mut row = customer();
    row.billing = Some(Address {
        street: "2 Side St".into(),
        city: "Shelbyville".into(),
    });
    let args = stmt.args_with(&row, &[Value::from("Ogdenville")]).unwrap();
    assert_eq!(args, vec![Value::Text("Ogdenville".into()), Value::Int(42)]);

    let select = schema
        .prepare::<Customer>("select billing_street from customers where billing_town = ?")
        .unwrap();
    assert!(select.binds().iter().all(|b| matches!(b, Bind::Argument(0))));
}

#[test]
fn test_select_by_key() {
    let schema = Schema::new(Dialect::MsSql, Convention::Snake);
    let stmt = schema.select_by_key::<Address>("addresses");
    assert!(matches!(stmt, Err(SqlRowError::Schema { .. })));

    let stmt = schema.select_by_key::<Customer>("customers").unwrap();
    assert!(stmt.sql().ends_with("from [customers] where [id]=?"));
    assert_eq!(stmt.key_args(&[Value::Int(42)]).unwrap(), vec![Value::Int(42)]);
}

#[test]
fn test_private_field_is_not_mapped() {
    let schema = Schema::default();
    let model = schema.columns::<Customer>().unwrap();
    assert!(model.find("secret", Convention::Snake).is_err());
    assert!(model.find("session", Convention::Snake).is_err());
    assert!(model.find("attributes", Convention::Snake).is_err());
    assert_eq!(customer().secret, "hunter2");
}

#[test]
fn test_quoted_tag_name_is_not_json() {
    let schema = Schema::new(Dialect::Postgres, Convention::Snake);
    let model = schema.columns::<Counter>().unwrap();
    assert_eq!(
        model.column_names(Convention::Snake),
        vec!["id", "slot", "grade", "a json b"]
    );

    let row = Counter {
        id: 5,
        slot: 2,
        grade: 'b',
        label: "plain".into(),
        hits: Mutex::new(0),
    };
    let insert = schema.insert::<Counter>("counters").unwrap();
    assert_eq!(
        insert.args(&row).unwrap(),
        vec![
            Value::Int(5),
            Value::Int(2),
            Value::Text("b".into()),
            Value::Text("plain".into()),
        ]
    );
    assert_eq!(row.hits.lock().map(|h| *h).unwrap(), 0);
}

#[test]
fn test_wide_integer_out_of_range() {
    let schema = Schema::default();
    let row = Counter {
        id: u64::MAX,
        ..Counter::default()
    };
    let err = schema.insert::<Counter>("counters").unwrap().args(&row).unwrap_err();
    assert!(matches!(err, SqlRowError::TypeShape(_)));
}

#[test]
fn test_scan_row_into_record() {
    let schema = Schema::default();
    let model = schema.columns::<Customer>().unwrap();
    let names = model.column_names(Convention::Snake);
    let targets = model.scan_targets(names.as_slice(), Convention::Snake).unwrap();

    let mut source = customer();
    source.billing = Some(Address {
        street: "2 Side St".into(),
        city: "Shelbyville".into(),
    });
    let cells = model.values(model.columns(), &source).unwrap();
    assert_eq!(cells[names.iter().position(|n| n == "nickname").unwrap()], Value::Null);

    let scanned: Customer = targets.read(cells).unwrap();
    assert_eq!(scanned.id, 42);
    assert_eq!(scanned.name, "Ann");
    assert_eq!(scanned.home_address, source.home_address);
    assert_eq!(scanned.billing, source.billing);
    assert_eq!(scanned.audit, source.audit);
    assert_eq!(scanned.tags, vec!["vip"]);
    assert_eq!(scanned.avatar, vec![1, 2, 3]);
    assert_eq!(scanned.nickname, "");
    assert_eq!(scanned.secret, "");

    let cells = model.values(model.columns(), &customer()).unwrap();
    let scanned: Customer = targets.read(cells).unwrap();
    assert_eq!(scanned.billing, None);
}

#[test]
fn test_scan_rejects_unknown_and_mistyped_columns() {
    let schema = Schema::default();
    let model = schema.columns::<Customer>().unwrap();

    let err = model
        .scan_targets(&["id", "secret"][..], Convention::Snake)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Type shape error: result column 'secret' has no field in Customer"
    );

    let targets = model.scan_targets(&["id", "rev"][..], Convention::Snake).unwrap();
    let err = targets
        .read::<Customer>(vec![Value::Int(1), Value::from("three")])
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Type shape error: Customer.rev: cannot scan a text cell into i32"
    );
    assert!(targets.read::<Customer>(vec![Value::Int(1)]).is_err());
}
