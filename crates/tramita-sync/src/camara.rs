//! Chamber of Deputies open-data API extractor.
//!
//! For each tracked bill type, lists the bills touched in the window, then
//! pulls each bill's steps day by day and its principal author, and turns
//! every allow-listed step into an [`Update`].

use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use tracing::{debug, error, info, warn};
use tramita_core::{AllowList, BILL_TYPES, DateWindow, Update, UpdateKey};

use crate::fetch::{Envelope, Fetcher, Request};
use crate::FetchError;

pub const DEFAULT_BASE_URL: &str = "https://dadosabertos.camara.leg.br/api/v2";

const BILL_PAGE_URL: &str =
    "https://www.camara.leg.br/proposicoesWeb/fichadetramitacao?idProposicao=";
const PAGE_SIZE: u32 = 100;
const DATE_FORMAT: &str = "%Y-%m-%d";
const STEP_TIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S"];

/// A bill (proposição) as listed by `/proposicoes`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bill {
    pub id: u64,
    pub sigla_tipo: String,
    pub numero: u32,
    pub ano: i32,
    #[serde(default)]
    pub ementa: Option<String>,
}

impl Bill {
    pub fn tracking_url(&self) -> String {
        format!("{BILL_PAGE_URL}{}", self.id)
    }
}

/// A procedural step (tramitação) of a bill.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    pub sequencia: u32,
    pub data_hora: String,
    #[serde(default)]
    pub descricao_tramitacao: Option<String>,
    #[serde(default)]
    pub despacho: Option<String>,
}

impl Step {
    pub fn occurred_at(&self) -> Option<NaiveDateTime> {
        STEP_TIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(&self.data_hora, format).ok())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Author {
    nome: String,
    #[serde(default)]
    tipo: Option<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    ordem_assinatura: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Deputy {
    ultimo_status: DeputyStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeputyStatus {
    nome_eleitoral: String,
    sigla_partido: String,
}

pub struct ChamberSource {
    fetcher: Fetcher,
    base_url: String,
    allow_list: AllowList,
}

impl ChamberSource {
    /// `base_url` should be like `https://dadosabertos.camara.leg.br/api/v2`.
    pub fn new(fetcher: Fetcher, base_url: &str, allow_list: AllowList) -> Self {
        Self {
            fetcher,
            base_url: base_url.trim_end_matches('/').to_string(),
            allow_list,
        }
    }

    /// Candidate updates of every tracked bill type in the window.
    pub async fn updates(&self, window: &DateWindow) -> Vec<Update> {
        info!(%window, "fetching chamber updates");
        let mut updates = Vec::new();
        for bill_type in BILL_TYPES {
            updates.extend(self.updates_of_type(bill_type, window).await);
        }
        info!(count = updates.len(), "chamber updates fetched");
        updates
    }

    /// Candidate updates of one bill type. A failed bill listing yields no
    /// updates for this type and does not affect the others.
    pub async fn updates_of_type(&self, bill_type: &str, window: &DateWindow) -> Vec<Update> {
        let bills = match self.bills(bill_type, window).await {
            Ok(bills) => bills,
            Err(err) => {
                error!(bill_type, %window, error = %err, "listing bills failed");
                return Vec::new();
            }
        };
        info!(bill_type, count = bills.len(), "bills with activity");

        let mut updates = Vec::new();
        for bill in &bills {
            info!(
                bill = %format!("{} {}/{}", bill.sigla_tipo, bill.numero, bill.ano),
                "fetching bill steps"
            );
            let steps = self.steps(bill.id, window).await;
            let (author, party) = self.principal_author(bill.id).await;

            for step in &steps {
                let description = step.descricao_tramitacao.as_deref().unwrap_or_default();
                if !self.allow_list.is_promotable(description) {
                    debug!(bill_id = bill.id, step = description, "skipping step");
                    continue;
                }
                info!(bill_id = bill.id, step = description, "adding step");
                updates.push(build_update(bill, step, author.clone(), party.clone()));
            }
        }
        updates
    }

    /// Bills of `bill_type` with activity in the window, all pages. A page
    /// that is not a valid envelope fails the listing; a single unreadable
    /// bill is skipped.
    pub async fn bills(&self, bill_type: &str, window: &DateWindow) -> Result<Vec<Bill>, FetchError> {
        let request = Request::json(format!("{}/proposicoes", self.base_url))
            .param("dataInicio", window.start().format(DATE_FORMAT))
            .param("dataFim", window.end().format(DATE_FORMAT))
            .param("itens", PAGE_SIZE)
            .param("siglaTipo", bill_type);
        let items = self.fetcher.fetch_all_pages(&request).await?;
        let bills = items
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<Bill>(item) {
                Ok(bill) => Some(bill),
                Err(err) => {
                    warn!(bill_type, error = %err, "skipping unreadable bill");
                    None
                }
            })
            .collect();
        Ok(bills)
    }

    /// Steps of a bill in the window, queried one day at a time. Days whose
    /// response cannot be read are skipped.
    pub async fn steps(&self, bill_id: u64, window: &DateWindow) -> Vec<Step> {
        let mut steps = Vec::new();
        for day in window.days() {
            match self.steps_on(bill_id, day).await {
                Ok(found) => steps.extend(found),
                Err(err) => error!(bill_id, %day, error = %err, "fetching steps failed"),
            }
        }
        steps
    }

    async fn steps_on(&self, bill_id: u64, day: NaiveDate) -> Result<Vec<Step>, FetchError> {
        let day = day.format(DATE_FORMAT).to_string();
        let request = Request::json(format!("{}/proposicoes/{bill_id}/tramitacoes", self.base_url))
            .param("dataInicio", &day)
            .param("dataFim", &day);
        let envelope: Envelope<Vec<Step>> = self.fetcher.fetch_json(&request).await?;
        Ok(envelope.dados)
    }

    /// Principal author and party of a bill.
    ///
    /// Deputies are resolved to their electoral name and current party;
    /// other authors (the executive, the senate) keep their raw name and no
    /// party. Any failure yields `(None, None)`.
    pub async fn principal_author(&self, bill_id: u64) -> (Option<String>, Option<String>) {
        let principal = match self.principal(bill_id).await {
            Ok(Some(principal)) => principal,
            Ok(None) => {
                warn!(bill_id, "bill has no authors");
                return (None, None);
            }
            Err(err) => {
                error!(bill_id, error = %err, "fetching authors failed");
                return (None, None);
            }
        };

        let (Some("Deputado"), Some(uri)) = (principal.tipo.as_deref(), principal.uri.as_deref())
        else {
            return (Some(principal.nome), None);
        };

        debug!(name = %principal.nome, "resolving deputy party");
        match self.fetcher.fetch_json::<Envelope<Deputy>>(&Request::json(uri)).await {
            Ok(deputy) => {
                let status = deputy.dados.ultimo_status;
                (Some(status.nome_eleitoral), Some(status.sigla_partido))
            }
            Err(err) => {
                warn!(name = %principal.nome, error = %err, "deputy lookup failed, using raw name");
                (Some(principal.nome), None)
            }
        }
    }

    async fn principal(&self, bill_id: u64) -> Result<Option<Author>, FetchError> {
        let request = Request::json(format!("{}/proposicoes/{bill_id}/autores", self.base_url));
        let envelope: Envelope<Vec<Author>> = self.fetcher.fetch_json(&request).await?;
        let mut authors = envelope.dados;
        authors.sort_by(|a, b| b.ordem_assinatura.cmp(&a.ordem_assinatura));
        Ok(authors.into_iter().next())
    }
}

fn build_update(bill: &Bill, step: &Step, author: Option<String>, party: Option<String>) -> Update {
    let occurred_at = step.occurred_at();
    if occurred_at.is_none() {
        warn!(bill_id = bill.id, data_hora = %step.data_hora, "unreadable step timestamp");
    }
    Update {
        author,
        party,
        summary: bill.ementa.clone(),
        dispatch: step.despacho.clone(),
        step_kind: step.descricao_tramitacao.clone(),
        bill_url: Some(bill.tracking_url()),
        occurred_at,
        ..Update::new(UpdateKey::new(
            bill.sigla_tipo.clone(),
            bill.numero,
            bill.ano,
            Some(step.sequencia),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::RetryPolicy;
    use crate::testing::ScriptedTransport;
    use serde_json::json;
    use std::sync::Arc;

    const BASE: &str = "https://api.test/v2";
    const DEPUTY_URI: &str = "https://api.test/v2/deputados/204554";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn window() -> DateWindow {
        DateWindow::new(date(2019, 5, 13), date(2019, 5, 14)).unwrap()
    }

    fn source(transport: &Arc<ScriptedTransport>) -> ChamberSource {
        let fetcher = Fetcher::new(
            transport.clone(),
            RetryPolicy {
                jitter: false,
                ..RetryPolicy::default()
            },
        );
        ChamberSource::new(
            fetcher,
            &format!("{BASE}/"),
            AllowList::from_lines(["Remessa ao Senado Federal por meio de Ofício"]),
        )
    }

    fn bills_route(bill_type: &str) -> String {
        format!(
            "{BASE}/proposicoes?dataInicio=2019-05-13&dataFim=2019-05-14&itens=100&siglaTipo={bill_type}"
        )
    }

    fn steps_route(id: u64, day: &str) -> String {
        format!("{BASE}/proposicoes/{id}/tramitacoes?dataInicio={day}&dataFim={day}")
    }

    fn script_bill(transport: &ScriptedTransport) {
        transport.respond_json(
            &bills_route("PL"),
            json!({
                "dados": [{
                    "id": 2190000,
                    "uri": "https://api.test/v2/proposicoes/2190000",
                    "siglaTipo": "PL",
                    "codTipo": 139,
                    "numero": 1234,
                    "ano": 2019,
                    "ementa": "Altera a Lei nº 8.069"
                }],
                "links": [{ "rel": "self", "href": "ignored" }]
            }),
        );
        transport.respond_json(&steps_route(2190000, "2019-05-13"), json!({ "dados": [], "links": [] }));
        transport.respond_json(
            &steps_route(2190000, "2019-05-14"),
            json!({
                "dados": [
                    {
                        "sequencia": 1,
                        "dataHora": "2019-05-14T18:02",
                        "descricaoTramitacao": "Remessa ao Senado Federal por meio de Ofício",
                        "despacho": "Enviado ao Senado"
                    },
                    {
                        "sequencia": 2,
                        "dataHora": "2019-05-14T18:05",
                        "descricaoTramitacao": "Recebimento",
                        "despacho": "Recebido"
                    }
                ],
                "links": []
            }),
        );
    }

    fn script_deputy_author(transport: &ScriptedTransport) {
        transport.respond_json(
            &format!("{BASE}/proposicoes/2190000/autores"),
            json!({
                "dados": [
                    { "nome": "Fulano", "tipo": "Deputado", "uri": "https://api.test/v2/deputados/1", "ordemAssinatura": 0 },
                    { "nome": "Leonardo Silva", "tipo": "Deputado", "uri": DEPUTY_URI, "ordemAssinatura": 1 }
                ],
                "links": []
            }),
        );
        transport.respond_json(
            DEPUTY_URI,
            json!({
                "dados": { "ultimoStatus": { "nomeEleitoral": "Dr. Leonardo", "siglaPartido": "PT" } },
                "links": []
            }),
        );
    }

    #[tokio::test]
    async fn promotable_steps_become_updates() {
        let transport = Arc::new(ScriptedTransport::new());
        script_bill(&transport);
        script_deputy_author(&transport);

        let updates = source(&transport).updates(&window()).await;

        assert_eq!(updates.len(), 1);
        let update = &updates[0];
        assert_eq!(update.key, UpdateKey::new("PL", 1234, 2019, Some(1)));
        assert_eq!(update.author.as_deref(), Some("Dr. Leonardo"));
        assert_eq!(update.party.as_deref(), Some("PT"));
        assert_eq!(update.summary.as_deref(), Some("Altera a Lei nº 8.069"));
        assert_eq!(update.dispatch.as_deref(), Some("Enviado ao Senado"));
        assert_eq!(
            update.bill_url.as_deref(),
            Some("https://www.camara.leg.br/proposicoesWeb/fichadetramitacao?idProposicao=2190000")
        );
        assert_eq!(
            update.occurred_at,
            date(2019, 5, 14).and_hms_opt(18, 2, 0)
        );
        assert!(update.post_url.is_none());
        assert!(update.posted_at.is_none());
        assert!(update.ups.is_none());
        assert!(!update.flagged);
    }

    #[tokio::test]
    async fn steps_are_queried_once_per_day() {
        let transport = Arc::new(ScriptedTransport::new());
        script_bill(&transport);
        script_deputy_author(&transport);

        source(&transport).updates(&window()).await;

        assert_eq!(transport.count_for(&steps_route(2190000, "2019-05-13")), 1);
        assert_eq!(transport.count_for(&steps_route(2190000, "2019-05-14")), 1);
        for bill_type in BILL_TYPES {
            assert_eq!(transport.count_for(&bills_route(bill_type)), 1);
        }
    }

    #[tokio::test]
    async fn non_deputy_author_keeps_raw_name_without_party() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_json(
            &format!("{BASE}/proposicoes/7/autores"),
            json!({
                "dados": [{ "nome": "Poder Executivo", "tipo": "Órgão do Poder Executivo", "uri": null, "ordemAssinatura": 1 }],
                "links": []
            }),
        );

        let (author, party) = source(&transport).principal_author(7).await;
        assert_eq!(author.as_deref(), Some("Poder Executivo"));
        assert!(party.is_none());
    }

    #[tokio::test]
    async fn failed_deputy_lookup_falls_back_to_raw_name() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_json(
            &format!("{BASE}/proposicoes/7/autores"),
            json!({
                "dados": [{ "nome": "Leonardo Silva", "tipo": "Deputado", "uri": DEPUTY_URI, "ordemAssinatura": 1 }],
                "links": []
            }),
        );
        transport.respond_json(DEPUTY_URI, json!({ "dados": { "ultimoStatus": {} }, "links": [] }));

        let (author, party) = source(&transport).principal_author(7).await;
        assert_eq!(author.as_deref(), Some("Leonardo Silva"));
        assert!(party.is_none());
    }

    #[tokio::test]
    async fn failed_author_lookup_is_not_fatal() {
        let transport = Arc::new(ScriptedTransport::new());
        script_bill(&transport);
        transport.fail(&format!("{BASE}/proposicoes/2190000/autores"), "connection reset");

        let updates = source(&transport).updates(&window()).await;
        assert_eq!(updates.len(), 1);
        assert!(updates[0].author.is_none());
        assert!(updates[0].party.is_none());
        assert_eq!(updates[0].dispatch.as_deref(), Some("Enviado ao Senado"));
    }

    #[tokio::test]
    async fn bill_without_authors_has_unknown_author() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_json(
            &format!("{BASE}/proposicoes/7/autores"),
            json!({ "dados": [], "links": [] }),
        );
        assert_eq!(source(&transport).principal_author(7).await, (None, None));
    }

    #[tokio::test]
    async fn malformed_listing_only_drops_its_own_type() {
        let transport = Arc::new(ScriptedTransport::new());
        script_bill(&transport);
        script_deputy_author(&transport);
        transport.respond(&bills_route("PEC"), 200, "<html>erro</html>");

        let source = source(&transport);
        assert!(source.updates_of_type("PEC", &window()).await.is_empty());
        assert_eq!(source.updates(&window()).await.len(), 1);
    }

    #[tokio::test]
    async fn unreadable_bill_is_skipped_without_dropping_the_listing() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_json(
            &bills_route("PL"),
            json!({
                "dados": [
                    { "id": 2190000, "siglaTipo": "PL", "numero": 1234, "ano": 2019 },
                    { "id": "not-a-number", "siglaTipo": "PL" },
                    { "id": 2190001, "siglaTipo": "PL", "numero": 1235, "ano": 2019 }
                ],
                "links": []
            }),
        );

        let bills = source(&transport).bills("PL", &window()).await.unwrap();
        let numbers: Vec<u32> = bills.iter().map(|bill| bill.numero).collect();
        assert_eq!(numbers, vec![1234, 1235]);
    }

    #[tokio::test]
    async fn unreadable_day_is_skipped() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(&steps_route(2190000, "2019-05-13"), 200, "{\"erro\": true}");
        transport.respond_json(
            &steps_route(2190000, "2019-05-14"),
            json!({
                "dados": [{ "sequencia": 5, "dataHora": "2019-05-14T10:00", "descricaoTramitacao": "Recebimento" }],
                "links": []
            }),
        );

        let steps = source(&transport).steps(2190000, &window()).await;
        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].sequencia, 5);
        assert!(steps[0].despacho.is_none());
    }

    #[test]
    fn step_timestamps_with_and_without_seconds() {
        let step = |data_hora: &str| Step {
            sequencia: 1,
            data_hora: data_hora.to_string(),
            descricao_tramitacao: None,
            despacho: None,
        };
        assert_eq!(
            step("2019-05-14T18:02").occurred_at(),
            date(2019, 5, 14).and_hms_opt(18, 2, 0)
        );
        assert_eq!(
            step("2019-05-14T18:02:30").occurred_at(),
            date(2019, 5, 14).and_hms_opt(18, 2, 30)
        );
        assert_eq!(step("14/05/2019").occurred_at(), None);
    }
}
