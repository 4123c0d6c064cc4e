//! The booking-system fixture schema used by every scenario test in this
//! directory (§8): `Airport`, `Airline`, `Plane`, `Route`, `Flight`,
//! `Ticket`, `Order`, `User`, `Role`. Registration is idempotent so every
//! test file in this crate's `tests/` binary can call it without caring
//! which test runs first.

use ormcrust::field::{FieldDef, FieldKind, RefAction};
use ormcrust::{ModelBuilder, ModelRegistry};
use std::sync::Once;

static REGISTER: Once = Once::new();

pub fn register() {
    REGISTER.call_once(|| {
        ModelRegistry::register(
            ModelBuilder::new("Role")
                .field("name", FieldDef::new(FieldKind::Varchar { size: 32 }).unique(true))
                .unwrap()
                .build(),
        );
        ModelRegistry::register(
            ModelBuilder::new("User")
                .field("username", FieldDef::new(FieldKind::Varchar { size: 64 }).unique(true))
                .unwrap()
                .field("email", FieldDef::new(FieldKind::Varchar { size: 128 }))
                .unwrap()
                .field(
                    "role",
                    FieldDef::new(FieldKind::ForeignKey {
                        ref_model: "Role",
                        on_delete: RefAction::SetNull,
                        on_update: RefAction::Cascade,
                    })
                    .null(true),
                )
                .unwrap()
                .build(),
        );
        ModelRegistry::register(
            ModelBuilder::new("Airport")
                .field("name", FieldDef::new(FieldKind::Varchar { size: 128 }))
                .unwrap()
                .field("code", FieldDef::new(FieldKind::Varchar { size: 8 }).unique(true))
                .unwrap()
                .field("city", FieldDef::new(FieldKind::Varchar { size: 64 }))
                .unwrap()
                .field("country", FieldDef::new(FieldKind::Varchar { size: 64 }))
                .unwrap()
                .field("capacity", FieldDef::new(FieldKind::Int))
                .unwrap()
                .build(),
        );
        ModelRegistry::register(
            ModelBuilder::new("Airline")
                .field("name", FieldDef::new(FieldKind::Varchar { size: 128 }))
                .unwrap()
                .field("country", FieldDef::new(FieldKind::Varchar { size: 64 }))
                .unwrap()
                .build(),
        );
        ModelRegistry::register(
            ModelBuilder::new("Plane")
                .field("name", FieldDef::new(FieldKind::Varchar { size: 128 }))
                .unwrap()
                .field("capacity", FieldDef::new(FieldKind::Json))
                .unwrap()
                .field(
                    "airline",
                    FieldDef::new(FieldKind::ForeignKey {
                        ref_model: "Airline",
                        on_delete: RefAction::Cascade,
                        on_update: RefAction::Cascade,
                    }),
                )
                .unwrap()
                .build(),
        );
        ModelRegistry::register(
            ModelBuilder::new("Route")
                .field("departure_time", FieldDef::new(FieldKind::DateTime))
                .unwrap()
                .field("arrival_time", FieldDef::new(FieldKind::DateTime))
                .unwrap()
                .field("flight_time", FieldDef::new(FieldKind::Duration))
                .unwrap()
                .field(
                    "departure_point",
                    FieldDef::new(FieldKind::ForeignKey {
                        ref_model: "Airport",
                        on_delete: RefAction::Cascade,
                        on_update: RefAction::Cascade,
                    }),
                )
                .unwrap()
                .field(
                    "arrival_point",
                    FieldDef::new(FieldKind::ForeignKey {
                        ref_model: "Airport",
                        on_delete: RefAction::Cascade,
                        on_update: RefAction::Cascade,
                    }),
                )
                .unwrap()
                .field(
                    "plane",
                    FieldDef::new(FieldKind::ForeignKey {
                        ref_model: "Plane",
                        on_delete: RefAction::Cascade,
                        on_update: RefAction::Cascade,
                    }),
                )
                .unwrap()
                .build(),
        );
        ModelRegistry::register(
            ModelBuilder::new("Flight")
                .field("costs", FieldDef::new(FieldKind::Json))
                .unwrap()
                .field(
                    "routes",
                    FieldDef::new(FieldKind::ManyToMany {
                        ref_model: "Route",
                        on_delete: RefAction::Cascade,
                        on_update: RefAction::Cascade,
                    }),
                )
                .unwrap()
                .build(),
        );
        ModelRegistry::register(
            ModelBuilder::new("Ticket")
                .field("economy_price", FieldDef::new(FieldKind::Float))
                .unwrap()
                .field(
                    "flight",
                    FieldDef::new(FieldKind::ForeignKey {
                        ref_model: "Flight",
                        on_delete: RefAction::Cascade,
                        on_update: RefAction::Cascade,
                    }),
                )
                .unwrap()
                .build(),
        );
        ModelRegistry::register(
            ModelBuilder::new("Order")
                .field(
                    "user",
                    FieldDef::new(FieldKind::ForeignKey {
                        ref_model: "User",
                        on_delete: RefAction::Cascade,
                        on_update: RefAction::Cascade,
                    }),
                )
                .unwrap()
                .field(
                    "ticket",
                    FieldDef::new(FieldKind::ForeignKey {
                        ref_model: "Ticket",
                        on_delete: RefAction::Cascade,
                        on_update: RefAction::Cascade,
                    }),
                )
                .unwrap()
                .build(),
        );
    });
}
