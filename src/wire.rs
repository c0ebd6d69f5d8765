//! Line-delimited JSON over TCP: one request object per line, one
//! response object per line. Timestamps are unix milliseconds; money
//! fields are decimal strings. The front end owns authentication and
//! receipt-file upload — `record-payment` carries only the stored
//! reference.

use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{error, warn};
use ulid::Ulid;

use crate::engine::{Engine, EngineError, ErrorKind};
use crate::limits::MAX_REQUEST_LINE_LEN;
use crate::model::*;
use crate::observability;

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum Request {
    CreateRoom {
        #[serde(default)]
        name: Option<String>,
        room_type: String,
        rate: Decimal,
        capacity: u32,
    },
    UpdateRoom {
        room_id: Ulid,
        #[serde(default)]
        name: Option<String>,
        rate: Decimal,
        capacity: u32,
        status: RoomStatus,
    },
    DefineAddon {
        name: String,
        kind: AddonKind,
        cost: Decimal,
    },
    RepriceAddon {
        addon_id: Ulid,
        cost: Decimal,
    },
    RetireAddon {
        addon_id: Ulid,
    },
    CreateBooking {
        customer_id: Ulid,
        room_id: Ulid,
        check_in: Ms,
        check_out: Ms,
        guests: u32,
        #[serde(default)]
        amenity_ids: Vec<Ulid>,
        #[serde(default)]
        service_ids: Vec<Ulid>,
    },
    RecordPayment {
        booking_id: Ulid,
        amount: Decimal,
        method: PaymentMethod,
        receipt_file: String,
    },
    CancelBooking {
        booking_id: Ulid,
        customer_id: Ulid,
    },
    CheckAvailability {
        room_id: Ulid,
        check_in: Ms,
        check_out: Ms,
    },
    OpenWindows {
        room_id: Ulid,
        start: Ms,
        end: Ms,
    },
    ListRooms,
    ListAddons,
    GetBooking {
        booking_id: Ulid,
    },
    Watch {
        room_id: Ulid,
    },
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Ulid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking_id: Option<Ulid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fully_paid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refund_amount: Option<Decimal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_windows: Option<Vec<Span>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rooms: Option<Vec<RoomInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub addons: Option<Vec<CatalogAddon>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub booking: Option<BookingDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
}

impl Response {
    fn ok() -> Self {
        Self {
            success: true,
            ..Default::default()
        }
    }

    fn bad_request(message: String) -> Self {
        Self {
            error_message: Some(message),
            error_kind: Some(ErrorKind::Validation.label()),
            ..Default::default()
        }
    }

    /// Map an engine failure per the propagation policy: every kind gets
    /// its Display text except Persistence, which is logged for follow-up
    /// and replaced — internal storage detail never reaches the client.
    fn err(e: &EngineError) -> Self {
        let kind = e.kind();
        let message = match kind {
            ErrorKind::Persistence => {
                error!("persistence failure: {e}");
                "storage failure, please retry".to_string()
            }
            _ => e.to_string(),
        };
        Self {
            error_message: Some(message),
            error_kind: Some(kind.label()),
            ..Default::default()
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Notification<'a> {
    notification: &'a Event,
}

async fn dispatch(engine: &Engine, req: Request) -> Response {
    match req {
        Request::CreateRoom {
            name,
            room_type,
            rate,
            capacity,
        } => {
            let id = Ulid::new();
            match engine.create_room(id, name, room_type, rate, capacity).await {
                Ok(()) => Response {
                    id: Some(id),
                    ..Response::ok()
                },
                Err(e) => Response::err(&e),
            }
        }
        Request::UpdateRoom {
            room_id,
            name,
            rate,
            capacity,
            status,
        } => match engine.update_room(room_id, name, rate, capacity, status).await {
            Ok(()) => Response::ok(),
            Err(e) => Response::err(&e),
        },
        Request::DefineAddon { name, kind, cost } => {
            let id = Ulid::new();
            match engine.define_addon(id, name, kind, cost).await {
                Ok(()) => Response {
                    id: Some(id),
                    ..Response::ok()
                },
                Err(e) => Response::err(&e),
            }
        }
        Request::RepriceAddon { addon_id, cost } => {
            match engine.reprice_addon(addon_id, cost).await {
                Ok(()) => Response::ok(),
                Err(e) => Response::err(&e),
            }
        }
        Request::RetireAddon { addon_id } => match engine.retire_addon(addon_id).await {
            Ok(()) => Response::ok(),
            Err(e) => Response::err(&e),
        },
        Request::CreateBooking {
            customer_id,
            room_id,
            check_in,
            check_out,
            guests,
            amenity_ids,
            service_ids,
        } => {
            let id = Ulid::new();
            match engine
                .create_booking(
                    id,
                    room_id,
                    customer_id,
                    check_in,
                    check_out,
                    guests,
                    &amenity_ids,
                    &service_ids,
                )
                .await
            {
                Ok(total) => Response {
                    booking_id: Some(id),
                    total_cost: Some(total),
                    ..Response::ok()
                },
                Err(e) => Response::err(&e),
            }
        }
        Request::RecordPayment {
            booking_id,
            amount,
            method,
            receipt_file,
        } => {
            match engine
                .record_payment(Ulid::new(), booking_id, amount, method, receipt_file)
                .await
            {
                Ok(outcome) => Response {
                    remaining: Some(outcome.remaining),
                    fully_paid: Some(outcome.fully_paid),
                    ..Response::ok()
                },
                Err(e) => Response::err(&e),
            }
        }
        Request::CancelBooking {
            booking_id,
            customer_id,
        } => match engine.cancel_booking(booking_id, customer_id).await {
            Ok(refund) => Response {
                refund_amount: Some(refund),
                ..Response::ok()
            },
            Err(e) => Response::err(&e),
        },
        Request::CheckAvailability {
            room_id,
            check_in,
            check_out,
        } => match engine.is_available(room_id, check_in, check_out, None).await {
            Ok(available) => Response {
                available: Some(available),
                ..Response::ok()
            },
            Err(e) => Response::err(&e),
        },
        Request::OpenWindows { room_id, start, end } => {
            match engine.open_windows(room_id, start, end).await {
                Ok(windows) => Response {
                    open_windows: Some(windows),
                    ..Response::ok()
                },
                Err(e) => Response::err(&e),
            }
        }
        Request::ListRooms => Response {
            rooms: Some(engine.list_rooms().await),
            ..Response::ok()
        },
        Request::ListAddons => Response {
            addons: Some(engine.list_addons()),
            ..Response::ok()
        },
        Request::GetBooking { booking_id } => match engine.get_booking(booking_id).await {
            Ok(detail) => Response {
                booking: Some(detail),
                ..Response::ok()
            },
            Err(e) => Response::err(&e),
        },
        // Watch switches connection state, handled by process_connection
        Request::Watch { .. } => Response::bad_request("watch not routable here".into()),
    }
}

async fn recv_watch(
    watch: &mut Option<broadcast::Receiver<Event>>,
) -> Result<Event, broadcast::error::RecvError> {
    match watch {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

/// Drive one client connection until EOF. A `watch` request switches the
/// connection into streaming mode: committed events for the room are
/// pushed as `{"notification": ...}` lines interleaved with responses.
pub async fn process_connection(
    socket: TcpStream,
    engine: Arc<Engine>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut framed = Framed::new(socket, LinesCodec::new_with_max_length(MAX_REQUEST_LINE_LEN));
    let mut watch: Option<broadcast::Receiver<Event>> = None;

    loop {
        tokio::select! {
            line = framed.next() => {
                let Some(line) = line else { break };
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                let response = match serde_json::from_str::<Request>(&line) {
                    Ok(req) => {
                        let label = observability::op_label(&req);
                        let start = Instant::now();
                        let resp = match req {
                            Request::Watch { room_id } => {
                                if engine.get_room(&room_id).is_none() {
                                    Response::err(&EngineError::NotFound(room_id))
                                } else {
                                    watch = Some(engine.notify.subscribe(room_id));
                                    Response::ok()
                                }
                            }
                            other => dispatch(&engine, other).await,
                        };
                        metrics::histogram!(observability::REQUEST_DURATION_SECONDS, "op" => label)
                            .record(start.elapsed().as_secs_f64());
                        let status = if resp.success { "ok" } else { "error" };
                        metrics::counter!(observability::REQUESTS_TOTAL, "op" => label, "status" => status)
                            .increment(1);
                        resp
                    }
                    Err(e) => Response::bad_request(format!("malformed request: {e}")),
                };
                framed.send(serde_json::to_string(&response)?).await?;
            }
            event = recv_watch(&mut watch), if watch.is_some() => {
                match event {
                    Ok(event) => {
                        let line = serde_json::to_string(&Notification { notification: &event })?;
                        framed.send(line).await?;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("watch subscriber lagged by {n} events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        watch = None;
                    }
                }
            }
        }
    }

    Ok(())
}
