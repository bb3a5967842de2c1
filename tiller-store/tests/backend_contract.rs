//! Behaviour every `Backender` must share, run against each backend.

use tiller_core::{Backender, Protocol, Server, Service, TillerError};

fn service(host: &str, port: u16, servers: &[(&str, u16)]) -> Service {
    let mut svc = Service::new(Protocol::Tcp, host, port);
    svc.scheduler = "wrr".into();
    for (h, p) in servers {
        svc.servers.push(Server::new(*h, *p));
    }
    svc.normalize();
    svc
}

fn server(host: &str, port: u16, weight: u32) -> Server {
    let mut srv = Server::new(host, port);
    srv.weight = weight;
    srv.gen_id();
    srv
}

pub fn empty_store_lists_nothing(store: &dyn Backender) {
    assert!(store.get_services().unwrap().is_empty());
}

pub fn upsert_is_idempotent(store: &dyn Backender) {
    let svc = service("10.0.0.5", 80, &[]);
    store.set_service(&svc).unwrap();
    let mut changed = svc.clone();
    changed.scheduler = "rr".into();
    store.set_service(&changed).unwrap();

    let all = store.get_services().unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].scheduler, "rr", "second write overwrites the first");
}

pub fn get_missing_service_is_no_service(store: &dyn Backender) {
    assert!(matches!(
        store.get_service("tcp-10_0_0_99-80"),
        Err(TillerError::NoService)
    ));
}

pub fn delete_missing_service_is_no_service(store: &dyn Backender) {
    store.set_service(&service("10.0.0.5", 80, &[])).unwrap();
    assert!(matches!(
        store.delete_service("udp-10_0_0_5-53"),
        Err(TillerError::NoService)
    ));
    assert_eq!(store.get_services().unwrap().len(), 1);
}

pub fn set_services_replaces_collection(store: &dyn Backender) {
    store.set_service(&service("10.0.0.1", 80, &[])).unwrap();
    store.set_service(&service("10.0.0.2", 80, &[])).unwrap();
    store
        .set_services(&[service("10.0.0.2", 80, &[]), service("10.0.0.3", 80, &[])])
        .unwrap();

    let ids: Vec<String> = store.get_services().unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["tcp-10_0_0_2-80", "tcp-10_0_0_3-80"]);

    store.set_services(&[]).unwrap();
    assert!(store.get_services().unwrap().is_empty());
}

pub fn set_servers_replaces_list(store: &dyn Backender) {
    let svc = service("10.0.0.5", 80, &[("10.0.0.7", 8080), ("10.0.0.8", 8080)]);
    store.set_service(&svc).unwrap();
    store
        .set_servers(&svc.id, &[server("10.0.0.9", 8080, 1)])
        .unwrap();

    let stored = store.get_service(&svc.id).unwrap();
    assert_eq!(stored.servers.len(), 1);
    assert_eq!(stored.servers[0].id, "10_0_0_9-8080");
}

pub fn set_server_upserts_by_id(store: &dyn Backender) {
    let svc = service("10.0.0.5", 80, &[("10.0.0.7", 8080)]);
    store.set_service(&svc).unwrap();

    store.set_server(&svc.id, &server("10.0.0.7", 8080, 5)).unwrap();
    store.set_server(&svc.id, &server("10.0.0.8", 8080, 1)).unwrap();

    let stored = store.get_service(&svc.id).unwrap();
    assert_eq!(stored.servers.len(), 2);
    assert_eq!(stored.servers[0].weight, 5);
    assert_eq!(stored.servers[1].id, "10_0_0_8-8080");
}

pub fn set_server_on_missing_service_fails(store: &dyn Backender) {
    assert!(matches!(
        store.set_server("tcp-10_0_0_5-80", &server("10.0.0.7", 8080, 1)),
        Err(TillerError::NoService)
    ));
}

pub fn delete_server_removes_only_match(store: &dyn Backender) {
    let svc = service(
        "10.0.0.5",
        80,
        &[("10.0.0.7", 8080), ("10.0.0.8", 8080), ("10.0.0.9", 8080)],
    );
    store.set_service(&svc).unwrap();
    store.delete_server(&svc.id, "10_0_0_8-8080").unwrap();

    let ids: Vec<String> = store
        .get_service(&svc.id)
        .unwrap()
        .servers
        .into_iter()
        .map(|s| s.id)
        .collect();
    assert_eq!(ids, vec!["10_0_0_7-8080", "10_0_0_9-8080"]);
}

pub fn delete_missing_server_leaves_state(store: &dyn Backender) {
    let svc = service("10.0.0.5", 80, &[("10.0.0.7", 8080)]);
    store.set_service(&svc).unwrap();
    assert!(matches!(
        store.delete_server(&svc.id, "10_0_0_8-8080"),
        Err(TillerError::NoServer)
    ));
    assert!(matches!(
        store.delete_server("tcp-10_0_0_6-80", "10_0_0_7-8080"),
        Err(TillerError::NoService)
    ));
    assert_eq!(store.get_service(&svc.id).unwrap(), svc);
}

pub fn get_server_uses_given_id(store: &dyn Backender) {
    let svc = service("10.0.0.5", 80, &[("10.0.0.7", 8080), ("10.0.0.8", 9090)]);
    store.set_service(&svc).unwrap();

    let srv = store.get_server(&svc.id, "10_0_0_8-9090").unwrap();
    assert_eq!(srv.host, "10.0.0.8");
    assert_eq!(srv.port, 9090);
    assert!(matches!(
        store.get_server(&svc.id, "srvId"),
        Err(TillerError::NoServer)
    ));
}

macro_rules! backend_contract {
    ($modname:ident, $make:expr) => {
        mod $modname {
            use super::*;

            #[test]
            fn empty_store_lists_nothing() {
                let (_guard, store) = $make;
                super::empty_store_lists_nothing(&store);
            }

            #[test]
            fn upsert_is_idempotent() {
                let (_guard, store) = $make;
                super::upsert_is_idempotent(&store);
            }

            #[test]
            fn get_missing_service_is_no_service() {
                let (_guard, store) = $make;
                super::get_missing_service_is_no_service(&store);
            }

            #[test]
            fn delete_missing_service_is_no_service() {
                let (_guard, store) = $make;
                super::delete_missing_service_is_no_service(&store);
            }

            #[test]
            fn set_services_replaces_collection() {
                let (_guard, store) = $make;
                super::set_services_replaces_collection(&store);
            }

            #[test]
            fn set_servers_replaces_list() {
                let (_guard, store) = $make;
                super::set_servers_replaces_list(&store);
            }

            #[test]
            fn set_server_upserts_by_id() {
                let (_guard, store) = $make;
                super::set_server_upserts_by_id(&store);
            }

            #[test]
            fn set_server_on_missing_service_fails() {
                let (_guard, store) = $make;
                super::set_server_on_missing_service_fails(&store);
            }

            #[test]
            fn delete_server_removes_only_match() {
                let (_guard, store) = $make;
                super::delete_server_removes_only_match(&store);
            }

            #[test]
            fn delete_missing_server_leaves_state() {
                let (_guard, store) = $make;
                super::delete_missing_server_leaves_state(&store);
            }

            #[test]
            fn get_server_uses_given_id() {
                let (_guard, store) = $make;
                super::get_server_uses_given_id(&store);
            }
        }
    };
}

backend_contract!(memory, ((), tiller_store::MemoryStore::new()));

backend_contract!(file, {
    let dir = tempfile::tempdir().unwrap();
    let store = tiller_store::FileStore::new(dir.path());
    store.init().unwrap();
    (dir, store)
});
