//! 🗝️ Every key the connector understands, and the immutable table of their defaults.
//!
//! 📜 One table, zero mutable globals. The view consults it; nobody writes to it.
//! If you add a key, add its default here or accept that "absent" means `None`.

pub const NODES: &str = "es.nodes";
/// ⚠️ deprecated spelling of `es.nodes`, honoured only when `es.nodes` is absent
pub const HOST: &str = "es.host";
pub const PORT: &str = "es.port";
pub const NODES_DISCOVERY: &str = "es.nodes.discovery";

pub const RESOURCE: &str = "es.resource";
pub const RESOURCE_READ: &str = "es.resource.read";
pub const RESOURCE_WRITE: &str = "es.resource.write";
pub const QUERY: &str = "es.query";

pub const BATCH_SIZE_BYTES: &str = "es.batch.size.bytes";
pub const BATCH_SIZE_ENTRIES: &str = "es.batch.size.entries";
pub const BATCH_FLUSH_MANUAL: &str = "es.batch.flush.manual";
pub const BATCH_WRITE_REFRESH: &str = "es.batch.write.refresh";
pub const BATCH_WRITE_RETRY_COUNT: &str = "es.batch.write.retry.count";
pub const BATCH_WRITE_RETRY_WAIT: &str = "es.batch.write.retry.wait";
pub const BATCH_WRITE_RETRY_POLICY: &str = "es.batch.write.retry.policy";
pub const BATCH_WRITE_IGNORE_EXISTING: &str = "es.batch.write.ignore.existing";

pub const HTTP_TIMEOUT: &str = "es.http.timeout";
pub const HTTP_RETRIES: &str = "es.http.retries";
pub const HTTP_AUTH_USER: &str = "es.net.http.auth.user";
pub const HTTP_AUTH_PASS: &str = "es.net.http.auth.pass";

pub const SCROLL_KEEPALIVE: &str = "es.scroll.keepalive";
pub const SCROLL_SIZE: &str = "es.scroll.size";
pub const SCROLL_FIELDS: &str = "es.scroll.fields";
pub const HEART_BEAT_LEAD: &str = "es.action.heart.beat.lead";

pub const INPUT_JSON: &str = "es.input.json";
pub const FIELD_READ_EMPTY_AS_NULL: &str = "es.field.read.empty.as.null";

pub const INDEX_AUTO_CREATE: &str = "es.index.auto.create";
pub const INDEX_READ_MISSING_AS_EMPTY: &str = "es.index.read.missing.as.empty";

pub const MAPPING_DEFAULT_EXTRACTOR_CLASS: &str = "es.mapping.default.extractor.class";
pub const MAPPING_ID: &str = "es.mapping.id";
pub const MAPPING_ID_EXTRACTOR_CLASS: &str = "es.mapping.id.extractor.class";
pub const MAPPING_PARENT: &str = "es.mapping.parent";
pub const MAPPING_PARENT_EXTRACTOR_CLASS: &str = "es.mapping.parent.extractor.class";
pub const MAPPING_VERSION: &str = "es.mapping.version";
pub const MAPPING_VERSION_EXTRACTOR_CLASS: &str = "es.mapping.version.extractor.class";
pub const MAPPING_ROUTING: &str = "es.mapping.routing";
pub const MAPPING_ROUTING_EXTRACTOR_CLASS: &str = "es.mapping.routing.extractor.class";
pub const MAPPING_TTL: &str = "es.mapping.ttl";
pub const MAPPING_TTL_EXTRACTOR_CLASS: &str = "es.mapping.ttl.extractor.class";
pub const MAPPING_TIMESTAMP: &str = "es.mapping.timestamp";
pub const MAPPING_TIMESTAMP_EXTRACTOR_CLASS: &str = "es.mapping.timestamp.extractor.class";
pub const MAPPING_INDEX_EXTRACTOR_CLASS: &str = "es.mapping.index.extractor.class";
pub const MAPPING_INDEX_FORMATTER_CLASS: &str = "es.mapping.index.formatter.class";
pub const MAPPING_PARAMS_EXTRACTOR_CLASS: &str = "es.mapping.params.extractor.class";

pub const READ_METADATA: &str = "es.read.metadata";
pub const READ_METADATA_FIELD: &str = "es.read.metadata.field";
pub const READ_METADATA_VERSION: &str = "es.read.metadata.version";

pub const WRITE_OPERATION: &str = "es.write.operation";
pub const UPDATE_RETRY_ON_CONFLICT: &str = "es.update.retry.on.conflict";
pub const UPDATE_SCRIPT: &str = "es.update.script";
pub const UPDATE_SCRIPT_LANG: &str = "es.update.script.lang";
pub const UPDATE_SCRIPT_PARAMS: &str = "es.update.script.params";
pub const UPDATE_SCRIPT_PARAMS_JSON: &str = "es.update.script.params.json";

pub const PROXY_HTTP_HOST: &str = "es.net.proxy.http.host";
pub const PROXY_HTTP_PORT: &str = "es.net.proxy.http.port";
pub const PROXY_HTTP_USER: &str = "es.net.proxy.http.user";
pub const PROXY_HTTP_PASS: &str = "es.net.proxy.http.pass";
pub const PROXY_HTTP_USE_SYSTEM_PROPS: &str = "es.net.proxy.http.use.system.props";
pub const PROXY_SOCKS_HOST: &str = "es.net.proxy.socks.host";
pub const PROXY_SOCKS_PORT: &str = "es.net.proxy.socks.port";
pub const PROXY_SOCKS_USER: &str = "es.net.proxy.socks.user";
pub const PROXY_SOCKS_PASS: &str = "es.net.proxy.socks.pass";
pub const PROXY_SOCKS_USE_SYSTEM_PROPS: &str = "es.net.proxy.socks.use.system.props";

/// 📛 Built-in strategy names, registered in every `ExtractorRegistry`.
pub const INDEX_TEMPLATE_EXTRACTOR: &str = "index.template";
pub const DATE_INDEX_FORMATTER: &str = "index.formatter.date";
pub const IDENTITY_INDEX_FORMATTER: &str = "index.formatter.identity";
pub const DEFAULT_PARAMS_EXTRACTOR: &str = "params.default";

/// 📜 The defaults table. Sorted by nothing in particular except vibes and the order
/// in which things go wrong at 3am.
pub const DEFAULTS: &[(&str, &str)] = &[
    (NODES, "localhost"),
    (PORT, "9200"),
    (NODES_DISCOVERY, "true"),
    (BATCH_SIZE_BYTES, "1mb"),
    (BATCH_SIZE_ENTRIES, "1000"),
    (BATCH_FLUSH_MANUAL, "false"),
    (BATCH_WRITE_REFRESH, "true"),
    (BATCH_WRITE_RETRY_COUNT, "3"),
    (BATCH_WRITE_RETRY_WAIT, "10s"),
    (BATCH_WRITE_RETRY_POLICY, "simple"),
    (BATCH_WRITE_IGNORE_EXISTING, "false"),
    (HTTP_TIMEOUT, "1m"),
    (HTTP_RETRIES, "3"),
    (SCROLL_KEEPALIVE, "5m"),
    (SCROLL_SIZE, "50"),
    (HEART_BEAT_LEAD, "15s"),
    (INPUT_JSON, "no"),
    (FIELD_READ_EMPTY_AS_NULL, "yes"),
    (INDEX_AUTO_CREATE, "yes"),
    (INDEX_READ_MISSING_AS_EMPTY, "false"),
    (MAPPING_INDEX_EXTRACTOR_CLASS, INDEX_TEMPLATE_EXTRACTOR),
    (MAPPING_INDEX_FORMATTER_CLASS, DATE_INDEX_FORMATTER),
    (MAPPING_PARAMS_EXTRACTOR_CLASS, DEFAULT_PARAMS_EXTRACTOR),
    (READ_METADATA, "false"),
    (READ_METADATA_FIELD, "_metadata"),
    (READ_METADATA_VERSION, "false"),
    (WRITE_OPERATION, "index"),
    (UPDATE_RETRY_ON_CONFLICT, "0"),
    (PROXY_HTTP_USE_SYSTEM_PROPS, "yes"),
    (PROXY_SOCKS_USE_SYSTEM_PROPS, "yes"),
];

/// 🔎 Look up the documented default for `key`, if it has one.
pub fn default_for(key: &str) -> Option<&'static str> {
    DEFAULTS
        .iter()
        .find(|(candidate, _)| *candidate == key)
        .map(|(_, value)| *value)
}
