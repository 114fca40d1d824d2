//! Company fixture: employees, departments and assets wired through the
//! public API.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, LazyLock};

use anyhow::Context as _;
use chrono::{DateTime, FixedOffset};
use rested_core::entity::{AccessorTable, Entity, EntityRef, LazyReference, Property, Reference};
use rested_core::mapper::{Data, DataMapper, RawInput};
use rested_core::metadata::{
    EntityMetadata, EntityMetadataRegistry, FieldMapping, ResourceMetadata, ResourceMetadataStore,
    ServiceMetadata, ServiceMetadataStore, TemporalKind,
};
use rested_core::{MappingError, Verb};
use rested_server::{
    Dispatcher, EventManager, Listener, RequestEvent, RestConfig, Service, ServiceContext,
    ServiceFactories, ServiceManager,
};

pub type CallLog = Arc<parking_lot::Mutex<Vec<String>>>;

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct Employee {
    pub id: i64,
    pub name: String,
    pub hired_at: Option<DateTime<FixedOffset>>,
    pub department: Option<Reference>,
    pub assets: Vec<Reference>,
}

static EMPLOYEE: LazyLock<AccessorTable<Employee>> = LazyLock::new(|| {
    AccessorTable::<Employee>::new("Company::Employee")
        .field("id", |e| e.id.into(), |e, v| {
            e.id = v.into_i64("id")?;
            Ok(())
        })
        .field("name", |e| e.name.as_str().into(), |e, v| {
            e.name = v.into_string("name")?;
            Ok(())
        })
        .field("hired_at", |e| e.hired_at.into(), |e, v| {
            e.hired_at = v.into_temporal("hired_at")?;
            Ok(())
        })
        .field("department", |e| Property::One(e.department.clone()), |e, v| {
            e.department = v.into_one("department")?;
            Ok(())
        })
        .field("assets", |e| Property::Many(e.assets.clone()), |e, v| {
            e.assets = v.into_many("assets")?;
            Ok(())
        })
});

impl Entity for Employee {
    fn entity_type(&self) -> &str {
        EMPLOYEE.type_name()
    }

    fn get(&self, property: &str) -> Option<Property> {
        EMPLOYEE.get(self, property)
    }

    fn set(&mut self, property: &str, value: Property) -> Result<(), MappingError> {
        EMPLOYEE.set(self, property, value)
    }
}

pub struct Department {
    pub id: i64,
    pub name: String,
    pub employees: Vec<Reference>,
}

static DEPARTMENT: LazyLock<AccessorTable<Department>> = LazyLock::new(|| {
    AccessorTable::<Department>::new("Company::Department")
        .read_only("id", |d| d.id.into())
        .read_only("name", |d| d.name.as_str().into())
        .read_only("employees", |d| Property::Many(d.employees.clone()))
});

impl Entity for Department {
    fn entity_type(&self) -> &str {
        DEPARTMENT.type_name()
    }

    fn get(&self, property: &str) -> Option<Property> {
        DEPARTMENT.get(self, property)
    }

    fn set(&mut self, property: &str, value: Property) -> Result<(), MappingError> {
        DEPARTMENT.set(self, property, value)
    }
}

pub struct Asset {
    pub id: i64,
    pub label: String,
}

static ASSET: LazyLock<AccessorTable<Asset>> = LazyLock::new(|| {
    AccessorTable::<Asset>::new("Company::Asset")
        .read_only("id", |a| a.id.into())
        .read_only("label", |a| a.label.as_str().into())
});

impl Entity for Asset {
    fn entity_type(&self) -> &str {
        ASSET.type_name()
    }

    fn get(&self, property: &str) -> Option<Property> {
        ASSET.get(self, property)
    }

    fn set(&mut self, property: &str, value: Property) -> Result<(), MappingError> {
        ASSET.set(self, property, value)
    }
}

pub fn hired_at() -> DateTime<FixedOffset> {
    DateTime::parse_from_rfc3339("2020-01-02T03:04:05+00:00").unwrap()
}

/// Alice in R&D with one laptop. The department lists Alice again through a
/// lazy reference that loads a fresh copy of her.
pub fn alice() -> EntityRef {
    let rnd: EntityRef = Arc::new(Department {
        id: 10,
        name: "R&D".to_string(),
        employees: vec![LazyReference::reference("Company::Employee", || Ok(alice()))],
    });
    let laptop: EntityRef = Arc::new(Asset {
        id: 100,
        label: "laptop".to_string(),
    });
    Arc::new(Employee {
        id: 1,
        name: "Alice".to_string(),
        hired_at: Some(hired_at()),
        department: Some(Reference::Loaded(rnd)),
        assets: vec![Reference::Loaded(laptop)],
    })
}

/// Entity metadata keyed by the same class names the resources use, so
/// sub-resource associations resolve to registered resources.
pub fn entity_metadata() -> Arc<EntityMetadataRegistry> {
    let mut builder = EntityMetadataRegistry::builder();
    builder
        .register(
            EntityMetadata::new("Company::Employee")
                .with_identifier("id")
                .with_field(FieldMapping::scalar("name"))
                .with_field(FieldMapping::temporal("hired_at", TemporalKind::DateTimeTz))
                .with_association("department", "Company::Department", false)
                .with_association("assets", "Company::Asset", true),
        )
        .unwrap()
        .register(
            EntityMetadata::new("Company::Department")
                .with_identifier("id")
                .with_field(FieldMapping::scalar("name"))
                .with_association("employees", "Company::Employee", true),
        )
        .unwrap()
        .register(
            EntityMetadata::new("Company::Asset")
                .with_identifier("id")
                .with_field(FieldMapping::scalar("label")),
        )
        .unwrap();
    Arc::new(builder.build())
}

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Listener method names in verb order.
pub const EMPLOYEE_METHODS: [(Verb, &str); 8] = [
    (Verb::Get, "get"),
    (Verb::GetCollection, "getCollection"),
    (Verb::Post, "post"),
    (Verb::PostCollection, "postCollection"),
    (Verb::Put, "put"),
    (Verb::PutCollection, "putCollection"),
    (Verb::Delete, "delete"),
    (Verb::DeleteCollection, "deleteCollection"),
];

fn describe(event: &RequestEvent) -> String {
    match event.parent() {
        Some(parent) => format!("{}/{}", parent.name(), event.resource().name()),
        None => event.resource().name().to_string(),
    }
}

/// Employee handler with one method per verb.
pub struct EmployeeService {
    ctx: ServiceContext,
    log: CallLog,
}

impl EmployeeService {
    fn record(&self, method: &str, event: &RequestEvent) {
        self.log
            .lock()
            .push(format!("EmployeeService.{method}({})", describe(event)));
    }

    fn mapper(&self) -> anyhow::Result<&Arc<dyn DataMapper>> {
        self.ctx.data_mapper.as_ref().context("employee service needs a data mapper")
    }

    fn get(&self, event: &mut RequestEvent) -> anyhow::Result<()> {
        self.record("get", event);
        let data = self.mapper()?.to_plain(&Data::Entity(alice()))?;
        event.set_data(data);
        Ok(())
    }

    fn get_collection(&self, event: &mut RequestEvent) -> anyhow::Result<()> {
        self.record("getCollection", event);
        let data = self.mapper()?.to_plain(&Data::entities([alice(), alice()]))?;
        event.set_data(data);
        Ok(())
    }

    fn post(&self, event: &mut RequestEvent) -> anyhow::Result<()> {
        self.record("post", event);
        let Some(payload) = event.payload() else {
            return Ok(());
        };
        let mut employee = Employee {
            id: 99,
            ..Employee::default()
        };
        self.mapper()?
            .map(&mut employee, &RawInput::Text(payload.to_string()))?;
        let data = self.mapper()?.to_plain(&Data::Entity(Arc::new(employee)))?;
        event.set_data(data);
        Ok(())
    }

    fn post_collection(&self, event: &mut RequestEvent) -> anyhow::Result<()> {
        self.record("postCollection", event);
        Ok(())
    }

    fn put(&self, event: &mut RequestEvent) -> anyhow::Result<()> {
        self.record("put", event);
        Ok(())
    }

    fn put_collection(&self, event: &mut RequestEvent) -> anyhow::Result<()> {
        self.record("putCollection", event);
        Ok(())
    }

    fn delete(&self, event: &mut RequestEvent) -> anyhow::Result<()> {
        self.record("delete", event);
        Ok(())
    }

    fn delete_collection(&self, event: &mut RequestEvent) -> anyhow::Result<()> {
        self.record("deleteCollection", event);
        Ok(())
    }
}

impl Service for EmployeeService {
    fn bind_listener(self: Arc<Self>, method: &str) -> Option<Listener> {
        let body: fn(&Self, &mut RequestEvent) -> anyhow::Result<()> = match method {
            "get" => Self::get,
            "getCollection" => Self::get_collection,
            "post" => Self::post,
            "postCollection" => Self::post_collection,
            "put" => Self::put,
            "putCollection" => Self::put_collection,
            "delete" => Self::delete,
            "deleteCollection" => Self::delete_collection,
            _ => return None,
        };
        Some(Listener::bind(self, method, body))
    }
}

/// Handler that records every call and understands a fixed set of names.
/// `fail` always errors.
pub struct RecordingService {
    name: &'static str,
    log: CallLog,
}

impl Service for RecordingService {
    fn bind_listener(self: Arc<Self>, method: &str) -> Option<Listener> {
        if !["get", "list", "audit", "fail"].contains(&method) {
            return None;
        }
        let method_name = method.to_string();
        Some(Listener::new(method, move |event| {
            self.log
                .lock()
                .push(format!("{}.{}({})", self.name, method_name, describe(event)));
            if method_name == "fail" {
                anyhow::bail!("{} refused {}", self.name, event.verb());
            }
            Ok(())
        }))
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

pub struct Company {
    pub manager: Arc<ServiceManager>,
    pub entities: Arc<EntityMetadataRegistry>,
    pub log: CallLog,
    pub constructed: Arc<AtomicU32>,
}

impl Company {
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(Arc::clone(&self.manager), self.entities.clone())
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.log.lock().clear();
    }

    pub fn constructed(&self) -> u32 {
        self.constructed.load(Ordering::SeqCst)
    }
}

fn resources() -> ResourceMetadataStore {
    let mut builder = ResourceMetadataStore::builder();
    builder
        .register(
            ResourceMetadata::new("Company::Employee")
                .with_service("EmployeeService")
                .with_sub_resource("assets", "assets", "AssetService")
                .unwrap()
                .with_sub_resource("department", "department", "DepartmentService")
                .unwrap(),
        )
        .unwrap()
        .register(ResourceMetadata::new("Company::Department").with_service("DepartmentService"))
        .unwrap()
        .register(ResourceMetadata::new("Company::Asset"))
        .unwrap();
    builder.build()
}

fn services() -> ServiceMetadataStore {
    let mut employee = ServiceMetadata::new("EmployeeService").with_data_mapper("json");
    for (verb, method) in EMPLOYEE_METHODS {
        employee.add_listener(verb, method);
    }

    let mut builder = ServiceMetadataStore::builder();
    builder
        .register(employee)
        .unwrap()
        .register(ServiceMetadata::new("AssetService").with_listener(Verb::Get, "list"))
        .unwrap()
        .register(
            ServiceMetadata::new("DepartmentService")
                .with_listener(Verb::Get, "audit")
                .with_listener(Verb::Get, "get")
                .with_listener(Verb::Get, "audit")
                .with_listener(Verb::Delete, "fail")
                .with_listener(Verb::Delete, "audit"),
        )
        .unwrap()
        .register(ServiceMetadata::new("GenericService").with_listener(Verb::Get, "get"))
        .unwrap();
    builder.build()
}

pub fn company() -> Company {
    company_with(&RestConfig::default())
}

/// Company wiring whose data mapper follows `config.mapper`.
pub fn company_with(config: &RestConfig) -> Company {
    let log: CallLog = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let constructed = Arc::new(AtomicU32::new(0));
    let entities = entity_metadata();

    let mut factories = ServiceFactories::new();
    {
        let log = Arc::clone(&log);
        let constructed = Arc::clone(&constructed);
        factories.register("EmployeeService", move |ctx| {
            constructed.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(EmployeeService {
                ctx,
                log: Arc::clone(&log),
            }) as Arc<dyn Service>)
        });
    }
    for name in ["AssetService", "DepartmentService", "GenericService"] {
        let log = Arc::clone(&log);
        let constructed = Arc::clone(&constructed);
        factories.register(name, move |_ctx| {
            constructed.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(RecordingService {
                name,
                log: Arc::clone(&log),
            }) as Arc<dyn Service>)
        });
    }

    let mapper: Arc<dyn DataMapper> = Arc::new(config.json_mapper(entities.clone()));
    let manager = ServiceManager::new(
        factories,
        Arc::new(services()),
        Arc::new(resources()),
        Arc::new(EventManager::new()),
    )
    .with_data_mapper("json", mapper);

    Company {
        manager: Arc::new(manager),
        entities,
        log,
        constructed,
    }
}
