use std::time::Duration;
use async_trait::async_trait;
use hickory_proto::op::{Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::domain::Label;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use hickory_proto::serialize::binary::BinEncodable;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use shared::types::ServiceRecord;
use crate::error::TransferError;
use crate::zone::ZoneSource;

/// Zone transfer (AXFR) client speaking DNS over TCP.
#[derive(Debug, Clone)]
pub struct AxfrClient {
    host: String,
    port: u16,
    timeout: Duration,
}

impl AxfrClient {
    pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
        Self {
            host: host.into(),
            port,
            timeout,
        }
    }

    async fn fetch(&self, domain: &str) -> Result<Vec<Record>, TransferError> {
        let origin = Name::from_ascii(format!("{}.", domain.trim_end_matches('.')))?;
        let id = query_id();

        let mut query = Message::new();
        query
            .set_id(id)
            .set_message_type(MessageType::Query)
            .set_op_code(OpCode::Query)
            .set_recursion_desired(false)
            .add_query(Query::query(origin, RecordType::AXFR));
        let bytes = query.to_vec()?;

        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        stream.write_u16(bytes.len() as u16).await?;
        stream.write_all(&bytes).await?;
        stream.flush().await?;

        // AXFR answers are framed by the zone SOA at both ends
        let mut records = Vec::new();
        let mut soa_seen = 0;
        while soa_seen < 2 {
            let len = stream.read_u16().await? as usize;
            let mut buf = vec![0u8; len];
            stream.read_exact(&mut buf).await?;

            let response = Message::from_vec(&buf)?;
            if response.id() != id {
                return Err(TransferError::Malformed(format!(
                    "response id {} does not match query id {}",
                    response.id(),
                    id
                )));
            }
            if response.response_code() != ResponseCode::NoError {
                return Err(TransferError::Refused(response.response_code()));
            }
            if response.answers().is_empty() {
                return Err(TransferError::Malformed("empty response message".into()));
            }

            for record in response.answers() {
                if record.record_type() == RecordType::SOA {
                    soa_seen += 1;
                    if soa_seen == 2 {
                        break;
                    }
                } else if soa_seen == 0 {
                    return Err(TransferError::Malformed("transfer does not start with SOA".into()));
                } else {
                    records.push(record.clone());
                }
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl ZoneSource for AxfrClient {
    async fn transfer(&self, domain: &str) -> Result<Vec<ServiceRecord>, TransferError> {
        let records = tokio::time::timeout(self.timeout, self.fetch(domain))
            .await
            .map_err(|_| TransferError::Timeout(self.timeout))??;

        tracing::debug!(domain, count = records.len(), "Zone transfer complete");
        service_records(domain, &records)
    }
}

/// Keep A records and name them by their zone-relative labels joined with
/// `domain`. The apex maps to `domain` itself.
pub fn service_records(domain: &str, records: &[Record]) -> Result<Vec<ServiceRecord>, TransferError> {
    let suffix = domain.trim_end_matches('.');
    let origin = Name::from_ascii(format!("{}.", suffix))?;
    let origin_labels = origin.iter().count();

    let mut services = Vec::new();
    for record in records {
        let address = match record.data() {
            Some(RData::A(a)) => a.to_string(),
            _ => {
                tracing::trace!(name = %record.name(), rtype = %record.record_type(), "Skipping non-A record");
                continue;
            }
        };

        let owner = record.name();
        if !origin.zone_of(owner) {
            tracing::debug!(name = %owner, domain = suffix, "Skipping record outside zone");
            continue;
        }

        let relative = owner.iter().count() - origin_labels;
        let name = if relative == 0 {
            suffix.to_string()
        } else {
            let labels = owner
                .iter()
                .take(relative)
                .map(|raw| Label::from_raw_bytes(raw).map(|label| label.to_ascii()))
                .collect::<Result<Vec<_>, _>>()?;
            format!("{}.{}", labels.join("."), suffix)
        };

        services.push(ServiceRecord { name, address });
    }

    Ok(services)
}

fn query_id() -> u16 {
    rand::random()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use hickory_proto::rr::rdata::{A, CNAME, SOA};
    use tokio::net::TcpListener;

    const DOMAIN: &str = "mgmt.example.net";

    fn a(name: &str, ip: [u8; 4]) -> Record {
        Record::from_rdata(
            Name::from_ascii(name).unwrap(),
            300,
            RData::A(A(Ipv4Addr::from(ip))),
        )
    }

    fn cname(name: &str, target: &str) -> Record {
        Record::from_rdata(
            Name::from_ascii(name).unwrap(),
            300,
            RData::CNAME(CNAME(Name::from_ascii(target).unwrap())),
        )
    }

    fn soa() -> Record {
        let soa = SOA::new(
            Name::from_ascii("ns1.mgmt.example.net.").unwrap(),
            Name::from_ascii("admin.mgmt.example.net.").unwrap(),
            1,
            3600,
            600,
            604800,
            60,
        );
        Record::from_rdata(Name::from_ascii("mgmt.example.net.").unwrap(), 300, RData::SOA(soa))
    }

    #[test]
    fn test_service_records_keeps_only_a() {
        let records = vec![
            a("kafka01.mgmt.example.net.", [10, 0, 0, 1]),
            cname("www.mgmt.example.net.", "kafka01.mgmt.example.net."),
            a("db.mgmt.example.net.", [10, 0, 0, 2]),
        ];

        let services = service_records(DOMAIN, &records).unwrap();
        assert_eq!(
            services,
            vec![
                ServiceRecord { name: "kafka01.mgmt.example.net".into(), address: "10.0.0.1".into() },
                ServiceRecord { name: "db.mgmt.example.net".into(), address: "10.0.0.2".into() },
            ]
        );
    }

    #[test]
    fn test_service_records_apex_and_foreign_names() {
        let records = vec![
            a("mgmt.example.net.", [10, 0, 0, 9]),
            a("elsewhere.example.org.", [10, 0, 0, 8]),
            a("notmgmt.example.net.", [10, 0, 0, 7]),
        ];

        let services = service_records("mgmt.example.net.", &records).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "mgmt.example.net");
    }

    #[test]
    fn test_service_records_uses_configured_suffix_spelling() {
        let services = service_records("Mgmt.Example.Net", &[a("web.mgmt.example.net.", [10, 0, 0, 1])]).unwrap();
        assert_eq!(services[0].name, "web.Mgmt.Example.Net");
    }

    #[test]
    fn test_service_records_splits_on_labels_not_text() {
        let records = vec![
            // one label "x.mgmt" under example.net, outside the zone
            a("x\\.mgmt.example.net.", [10, 0, 0, 1]),
            // two labels under the zone
            a("web.rack1.mgmt.example.net.", [10, 0, 0, 2]),
        ];

        let services = service_records(DOMAIN, &records).unwrap();
        assert_eq!(services.len(), 1);
        assert_eq!(services[0].name, "web.rack1.mgmt.example.net");
    }

    #[test]
    fn test_query_ids_are_not_sequential() {
        let ids: std::collections::HashSet<u16> = (0..32).map(|_| query_id()).collect();
        assert!(ids.len() > 1);
    }

    /// Serve one AXFR on a loopback listener, answering with `messages`.
    async fn serve_once(messages: Vec<(ResponseCode, Vec<Record>)>) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let len = stream.read_u16().await.unwrap() as usize;
            let mut buf = vec![0u8; len];
            stream.read_exact(&mut buf).await.unwrap();
            let query = Message::from_vec(&buf).unwrap();
            assert_eq!(query.queries()[0].query_type(), RecordType::AXFR);

            for (code, answers) in messages {
                let mut response = Message::new();
                response
                    .set_id(query.id())
                    .set_message_type(MessageType::Response)
                    .set_op_code(OpCode::Query)
                    .set_response_code(code)
                    .add_query(query.queries()[0].clone());
                response.add_answers(answers);

                let bytes = response.to_vec().unwrap();
                stream.write_u16(bytes.len() as u16).await.unwrap();
                stream.write_all(&bytes).await.unwrap();
            }
            stream.flush().await.unwrap();
        });

        port
    }

    #[tokio::test]
    async fn test_transfer_over_tcp() {
        let port = serve_once(vec![
            (ResponseCode::NoError, vec![soa(), a("kafka01.mgmt.example.net.", [10, 0, 0, 1])]),
            (
                ResponseCode::NoError,
                vec![
                    cname("www.mgmt.example.net.", "kafka01.mgmt.example.net."),
                    a("db.mgmt.example.net.", [10, 0, 0, 2]),
                    soa(),
                ],
            ),
        ])
        .await;

        let client = AxfrClient::new("127.0.0.1", port, Duration::from_secs(5));
        let services = client.transfer(DOMAIN).await.unwrap();

        let names: Vec<_> = services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["kafka01.mgmt.example.net", "db.mgmt.example.net"]);
    }

    #[tokio::test]
    async fn test_refused_transfer() {
        let port = serve_once(vec![(ResponseCode::Refused, vec![])]).await;

        let client = AxfrClient::new("127.0.0.1", port, Duration::from_secs(5));
        let result = client.transfer(DOMAIN).await;
        assert!(matches!(result, Err(TransferError::Refused(ResponseCode::Refused))));
    }

    #[tokio::test]
    async fn test_truncated_transfer() {
        let port = serve_once(vec![(ResponseCode::NoError, vec![soa(), a("a.mgmt.example.net.", [10, 0, 0, 1])])]).await;

        let client = AxfrClient::new("127.0.0.1", port, Duration::from_secs(5));
        assert!(matches!(client.transfer(DOMAIN).await, Err(TransferError::Io(_))));
    }

    #[tokio::test]
    async fn test_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = AxfrClient::new("127.0.0.1", port, Duration::from_secs(5));
        assert!(client.transfer(DOMAIN).await.is_err());
    }

    #[tokio::test]
    async fn test_hung_transfer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let hold = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
        });

        let client = AxfrClient::new("127.0.0.1", port, Duration::from_millis(200));
        assert!(matches!(client.transfer(DOMAIN).await, Err(TransferError::Timeout(_))));
        hold.abort();
    }
}
