use assert_cmd::cargo_bin;
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::io::Write;
use std::process::Command;

const CATALOG: &str = "tests/fixtures/catalog.json";
const REQUESTS: &str = "tests/fixtures/requests.csv";

#[test]
fn test_cli_end_to_end() -> Result<(), Box<dyn std::error::Error>> {
    let mut cmd = Command::new(cargo_bin!("panel-orders"));
    cmd.arg(CATALOG).arg(REQUESTS);

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(
            "order_no,user,kind,type,status,plan,quantity,price,discount,coupon,coupon_discount,gift_amount,fee_amount,amount,method,is_new,parent_order_no",
        ))
        // Gift balance pays for the whole purchase.
        .stdout(predicate::str::contains(
            ",1,purchase,1,pending,1,3,3000,0,,0,3000,0,0,balance,true,",
        ))
        // Coupon, then a 2% card fee on the rest.
        .stdout(predicate::str::contains(
            ",2,purchase,1,pending,1,1,1000,0,WELCOME,100,0,18,918,stripe_alipay,true,",
        ))
        .stdout(predicate::str::contains(
            ",3,renewal,2,pending,1,1,1000,0,,0,0,0,1000,balance,false,20250101000000aaaaaaaaaaaa",
        ))
        .stdout(predicate::str::contains(
            ",1,recharge,4,pending,,0,5000,0,,0,0,100,5100,stripe_alipay,true,",
        ))
        .stdout(predicate::str::contains("2100000000").not())
        .stderr(predicate::str::contains("request rejected"));

    Ok(())
}

#[test]
fn test_cli_close_unpaid() {
    let mut cmd = Command::new(cargo_bin!("panel-orders"));
    cmd.arg(CATALOG).arg(REQUESTS).arg("--close-unpaid");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(",1,purchase,1,cancelled,"))
        .stdout(predicate::str::contains(",pending,").not())
        .stderr(predicate::str::contains("expiry worker done"));
}

#[test]
fn test_cli_single_subscription_mode_from_env() {
    let mut cmd = Command::new(cargo_bin!("panel-orders"));
    cmd.arg(CATALOG)
        .arg(REQUESTS)
        .env("SUBSCRIBE_SINGLE_MODEL", "true");

    // User 3 already holds a subscription; renewals are still allowed.
    cmd.assert()
        .success()
        .stdout(predicate::str::contains(",3,renewal,2,pending,"))
        .stderr(predicate::str::contains("UserAlreadySubscribed").not());
}

#[test]
fn test_malformed_requests_are_skipped() {
    let mut csv = tempfile::NamedTempFile::new().unwrap();
    writeln!(csv, "kind,user,target,quantity,coupon,payment,amount").unwrap();
    writeln!(csv, "refund,1,1,1,,1,").unwrap();
    writeln!(csv, "purchase,abc,1,1,,1,").unwrap();
    writeln!(csv, "purchase,2,1,1,,1,").unwrap();

    let mut cmd = Command::new(cargo_bin!("panel-orders"));
    cmd.arg(CATALOG).arg(csv.path());

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("skipping malformed request"))
        .stdout(predicate::str::contains(
            ",2,purchase,1,pending,1,1,1000,0,,0,0,0,1000,balance,true,",
        ));
}

#[test]
fn test_missing_catalog_fails() {
    let mut cmd = Command::new(cargo_bin!("panel-orders"));
    cmd.arg("tests/fixtures/does_not_exist.json").arg(REQUESTS);

    cmd.assert().failure();
}

#[test]
fn test_json_logs() {
    let mut cmd = Command::new(cargo_bin!("panel-orders"));
    cmd.arg(CATALOG).arg(REQUESTS).arg("--log-format").arg("json");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("\"level\":\"INFO\""));
}

#[cfg(not(feature = "storage-rocksdb"))]
#[test]
fn test_rocksdb_fallback_warning() {
    let mut cmd = Command::new(cargo_bin!("panel-orders"));
    cmd.arg(CATALOG).arg(REQUESTS).arg("--db-path").arg("some_db");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."));
}

#[cfg(feature = "storage-rocksdb")]
#[test]
fn test_rocksdb_no_fallback_warning() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("orders_db");

    let mut cmd = Command::new(cargo_bin!("panel-orders"));
    cmd.arg(CATALOG).arg(REQUESTS).arg("--db-path").arg(&db_path);

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Falling back").not())
        .stdout(predicate::str::contains(",3,renewal,2,pending,"));
}

#[test]
fn test_out_of_range_close_window_fails() {
    let mut cmd = Command::new(cargo_bin!("panel-orders"));
    cmd.arg(CATALOG)
        .arg(REQUESTS)
        .env("ORDER_CLOSE_MINUTES", "1000000000000");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("out of range"));
}
