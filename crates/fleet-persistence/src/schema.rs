//! Esquema Diesel compartido por ambos motores (ver `migrations/`).

diesel::table! {
    hosts (host_id) {
        host_id -> BigInt,
        fqdn -> Text,
        role -> Text,
        branch -> Text,
        build_time -> BigInt,
        state -> Text,
        last_seen -> BigInt,
        runtime -> Double,
        pinned -> Bool,
    }
}

diesel::table! {
    reports (id) {
        id -> BigInt,
        host_id -> BigInt,
        fqdn -> Text,
        state -> Text,
        yaml_file -> Text,
        content_hash -> Text,
        runtime -> Double,
        executed_at -> BigInt,
        role -> Text,
        branch -> Text,
        build_time -> BigInt,
        total -> BigInt,
        skipped -> BigInt,
        failed -> BigInt,
        changed -> BigInt,
    }
}

diesel::table! {
    history (id) {
        id -> BigInt,
        date -> Text,
        failed -> BigInt,
        changed -> BigInt,
        unchanged -> BigInt,
    }
}

diesel::joinable!(reports -> hosts (host_id));

diesel::allow_tables_to_appear_in_same_query!(hosts, reports, history);
