// Copyright 2017 Axel Rasmussen
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::*;
use crate::pin::exchange::*;
use crate::tests::util::fixture;
use std::fs;
use std::os::unix::fs::PermissionsExt;

#[test]
fn test_stage_round_trip() {
    let f = fixture();
    let exchange = PinExchange::new(&f.paths.pin_exchange);
    let _staged = exchange.stage("123456", "654321").unwrap();

    assert_eq!(
        PinExchangeRequest {
            round: 0,
            old_pin: "123456".to_owned(),
            new_pin: "654321".to_owned(),
        },
        PinExchangeRequest::read(exchange.path()).unwrap()
    );
    assert_eq!(
        "round=0\noldpin=123456\nnewpin=654321\n",
        fs::read_to_string(exchange.path()).unwrap()
    );

    let mode = fs::metadata(exchange.path()).unwrap().permissions().mode();
    assert_eq!(0o600, mode & 0o777);
}

#[test]
fn test_release() {
    let f = fixture();
    let exchange = PinExchange::new(&f.paths.pin_exchange);
    let mut staged = exchange.stage("123456", "654321").unwrap();
    staged.release().unwrap();
    assert!(!exchange.path().exists());
    // Releasing is idempotent.
    staged.release().unwrap();
}

#[test]
fn test_release_after_external_delete() {
    let f = fixture();
    let exchange = PinExchange::new(&f.paths.pin_exchange);
    let mut staged = exchange.stage("123456", "654321").unwrap();
    fs::remove_file(exchange.path()).unwrap();
    staged.release().unwrap();
}

#[test]
fn test_drop_releases() {
    let f = fixture();
    let exchange = PinExchange::new(&f.paths.pin_exchange);
    {
        let _staged = exchange.stage("123456", "654321").unwrap();
        assert!(exchange.path().exists());
    }
    assert!(!exchange.path().exists());
    // And the exchange can be staged again afterwards.
    let _staged = exchange.stage("654321", "123456").unwrap();
}

#[test]
fn test_double_stage() {
    let f = fixture();
    let exchange = PinExchange::new(&f.paths.pin_exchange);
    let _staged = exchange.stage("123456", "654321").unwrap();
    match exchange.stage("111111", "222222") {
        Err(Error::ExchangeAlreadyStaged) => {}
        Err(e) => panic!("expected ExchangeAlreadyStaged, got {:?}", e),
        Ok(_) => panic!("expected ExchangeAlreadyStaged, got a second handle"),
    }
    // The first request is untouched.
    assert_eq!(
        "123456",
        PinExchangeRequest::read(exchange.path()).unwrap().old_pin
    );
}

#[test]
fn test_stale_file_replaced() {
    let f = fixture();
    fs::create_dir_all(f.paths.pin_exchange.parent().unwrap()).unwrap();
    fs::write(&f.paths.pin_exchange, "round=2\noldpin=000000\nnewpin=999999\n").unwrap();
    fs::set_permissions(&f.paths.pin_exchange, fs::Permissions::from_mode(0o644)).unwrap();

    let exchange = PinExchange::new(&f.paths.pin_exchange);
    let _staged = exchange.stage("123456", "654321").unwrap();
    let request = PinExchangeRequest::read(exchange.path()).unwrap();
    assert_eq!(0, request.round);
    assert_eq!("123456", request.old_pin);
    let mode = fs::metadata(exchange.path()).unwrap().permissions().mode();
    assert_eq!(0o600, mode & 0o777);
}

#[test]
fn test_parse_missing_field() {
    assert!(PinExchangeRequest::parse("round=0\noldpin=123456\n").is_err());
    assert!(PinExchangeRequest::parse("round=x\noldpin=1\nnewpin=2\n").is_err());
}
