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
use crate::pin::pinentry::*;
use crate::tests::device::{Call, TokenTestStub};
use crate::tests::util::fixture;
use std::fs;

static ORIGINAL_CONF: &str = "default-cache-ttl 600\npinentry-program /usr/bin/pinentry-curses\n";

#[test]
fn test_activate_and_restore() {
    let f = fixture();
    fs::create_dir_all(f.paths.agent_conf.parent().unwrap()).unwrap();
    fs::write(&f.paths.agent_conf, ORIGINAL_CONF).unwrap();

    let hal = TokenTestStub::new();
    let redirection = PinentryRedirection::new(&f.paths.agent_conf, &f.paths.substitute);
    let mut active = redirection.activate(&hal).unwrap();

    let substitute = f.paths.substitute.canonicalize().unwrap();
    assert_eq!(
        format!("pinentry-program {}\n", substitute.display()),
        fs::read_to_string(&f.paths.agent_conf).unwrap()
    );
    assert_eq!(
        ORIGINAL_CONF,
        fs::read_to_string(redirection.backup_path()).unwrap()
    );
    assert_eq!(1, hal.count(&Call::ReloadAgent));

    active.restore().unwrap();
    assert_eq!(
        ORIGINAL_CONF.as_bytes(),
        fs::read(&f.paths.agent_conf).unwrap().as_slice()
    );
    assert!(!redirection.backup_path().exists());
    assert_eq!(2, hal.count(&Call::ReloadAgent));

    // Restoring is idempotent.
    active.restore().unwrap();
    assert_eq!(2, hal.count(&Call::ReloadAgent));
}

#[test]
fn test_restore_without_original() {
    let f = fixture();
    let hal = TokenTestStub::new();
    let redirection = PinentryRedirection::new(&f.paths.agent_conf, &f.paths.substitute);
    {
        let _active = redirection.activate(&hal).unwrap();
        assert!(f.paths.agent_conf.exists());
    }
    assert!(!f.paths.agent_conf.exists());
    assert!(!redirection.backup_path().exists());
}

#[test]
fn test_drop_restores() {
    let f = fixture();
    fs::create_dir_all(f.paths.agent_conf.parent().unwrap()).unwrap();
    fs::write(&f.paths.agent_conf, ORIGINAL_CONF).unwrap();

    let hal = TokenTestStub::new();
    let redirection = PinentryRedirection::new(&f.paths.agent_conf, &f.paths.substitute);
    {
        let _active = redirection.activate(&hal).unwrap();
    }
    assert_eq!(ORIGINAL_CONF, fs::read_to_string(&f.paths.agent_conf).unwrap());
}

#[test]
fn test_substitute_not_found() {
    let f = fixture();
    fs::remove_file(&f.paths.substitute).unwrap();
    let hal = TokenTestStub::new();
    let redirection = PinentryRedirection::new(&f.paths.agent_conf, &f.paths.substitute);
    match redirection.activate(&hal) {
        Err(Error::SubstituteNotFound(_)) => {}
        Err(e) => panic!("expected SubstituteNotFound, got {:?}", e),
        Ok(_) => panic!("expected SubstituteNotFound, got an active redirection"),
    }
    assert!(!f.paths.agent_conf.exists());
    assert_eq!(0, hal.count(&Call::ReloadAgent));
}

#[test]
fn test_leftover_backup() {
    let f = fixture();
    fs::create_dir_all(f.paths.agent_conf.parent().unwrap()).unwrap();
    fs::write(&f.paths.agent_conf, "pinentry-program /tmp/stale\n").unwrap();

    let hal = TokenTestStub::new();
    let redirection = PinentryRedirection::new(&f.paths.agent_conf, &f.paths.substitute);
    fs::write(redirection.backup_path(), ORIGINAL_CONF).unwrap();

    match redirection.activate(&hal) {
        Err(Error::RedirectionAlreadyActive(_)) => {}
        Err(e) => panic!("expected RedirectionAlreadyActive, got {:?}", e),
        Ok(_) => panic!("expected RedirectionAlreadyActive, got an active redirection"),
    }
    // Nothing was touched; the real configuration is still in the backup.
    assert_eq!(
        ORIGINAL_CONF,
        fs::read_to_string(redirection.backup_path()).unwrap()
    );
    assert_eq!(
        "pinentry-program /tmp/stale\n",
        fs::read_to_string(&f.paths.agent_conf).unwrap()
    );
}

#[test]
fn test_double_activate() {
    let f = fixture();
    let hal = TokenTestStub::new();
    let redirection = PinentryRedirection::new(&f.paths.agent_conf, &f.paths.substitute);
    let _active = redirection.activate(&hal).unwrap();
    match redirection.activate(&hal) {
        Err(Error::RedirectionAlreadyActive(_)) => {}
        Err(e) => panic!("expected RedirectionAlreadyActive, got {:?}", e),
        Ok(_) => panic!("expected RedirectionAlreadyActive, got a second redirection"),
    };
}
